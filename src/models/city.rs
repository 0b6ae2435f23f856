use serde::{Deserialize, Serialize};

/// A monitored city: static configuration, no lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl City {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// Lowercased name used in raw filenames.
    pub fn file_slug(&self) -> String {
        self.name.to_lowercase()
    }
}

/// The fixed set of Indian cities the pipeline monitors.
pub fn default_cities() -> Vec<City> {
    vec![
        City::new("Delhi", 28.7041, 77.1025),
        City::new("Mumbai", 19.0760, 72.8777),
        City::new("Bengaluru", 12.9716, 77.5946),
        City::new("Hyderabad", 17.3850, 78.4867),
        City::new("Kolkata", 22.5726, 88.3639),
    ]
}
