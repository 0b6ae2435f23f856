use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Qualitative air-quality bucket derived solely from PM2.5 concentration.
/// Bands are closed on the upper bound and evaluated in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AqiCategory {
    Good,
    Moderate,
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn classify(pm2_5: f64) -> Self {
        if pm2_5 <= 50.0 {
            AqiCategory::Good
        } else if pm2_5 <= 100.0 {
            AqiCategory::Moderate
        } else if pm2_5 <= 200.0 {
            AqiCategory::Unhealthy
        } else if pm2_5 <= 300.0 {
            AqiCategory::VeryUnhealthy
        } else {
            AqiCategory::Hazardous
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

/// Coarse three-tier risk flag derived from the severity score.
/// Thresholds are exclusive lower bounds, evaluated high-to-low; a missing
/// score falls through to the lowest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Moderate Risk")]
    Moderate,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskLevel {
    pub fn classify(score: Option<f64>) -> Self {
        match score {
            Some(s) if s > 400.0 => RiskLevel::High,
            Some(s) if s > 200.0 => RiskLevel::Moderate,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low Risk",
            RiskLevel::Moderate => "Moderate Risk",
            RiskLevel::High => "High Risk",
        }
    }
}

/// One hour of readings for one city, as staged to CSV. Field order here is
/// the staged column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyRecord {
    pub city: String,
    pub time: Option<NaiveDateTime>,
    pub hour: Option<u32>,
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,
    pub aqi_category: Option<AqiCategory>,
    pub severity_score: Option<f64>,
    pub risk_classification: RiskLevel,
}

impl HourlyRecord {
    /// True if every pollutant reading is missing; such rows are dropped
    /// during the transform stage.
    pub fn all_pollutants_missing(&self) -> bool {
        self.pm10.is_none()
            && self.pm2_5.is_none()
            && self.carbon_monoxide.is_none()
            && self.nitrogen_dioxide.is_none()
            && self.sulphur_dioxide.is_none()
            && self.ozone.is_none()
            && self.uv_index.is_none()
    }

    /// Weighted severity score over six pollutants. Any missing operand
    /// makes the whole score missing (null propagation, not a partial sum).
    pub fn severity_score(&self) -> Option<f64> {
        Some(
            5.0 * self.pm2_5?
                + 3.0 * self.pm10?
                + 4.0 * self.nitrogen_dioxide?
                + 4.0 * self.sulphur_dioxide?
                + 2.0 * self.carbon_monoxide?
                + 3.0 * self.ozone?,
        )
    }

    /// Recompute the derived columns from the raw readings.
    pub fn derive_features(&mut self) {
        self.aqi_category = self.pm2_5.map(AqiCategory::classify);
        self.severity_score = self.severity_score();
        self.risk_classification = RiskLevel::classify(self.severity_score);
        self.hour = self.time.map(|t| t.hour());
    }
}
