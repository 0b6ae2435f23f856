//! Presentation-only chart rendering. Nothing downstream reads these files;
//! failures here still fail the analyze stage so they are never silent.

use std::collections::BTreeMap;
use std::path::Path;

use plotters::prelude::*;

use crate::analyzers::metrics::RemoteRecord;
use crate::error::{PipelineError, Result};

const CHART_SIZE: (u32, u32) = (900, 560);
const HISTOGRAM_BINS: usize = 30;

fn chart_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Chart(e.to_string())
}

fn risk_color(flag: &str) -> RGBColor {
    match flag {
        "High Risk" => RGBColor(200, 30, 30),
        "Moderate Risk" => RGBColor(240, 160, 20),
        "Low Risk" => RGBColor(40, 140, 70),
        _ => RGBColor(120, 120, 120),
    }
}

/// Render the four report charts into `dir`.
pub fn render_all(
    records: &[RemoteRecord],
    dist: &BTreeMap<String, BTreeMap<String, usize>>,
    dir: &Path,
) -> Result<()> {
    pm25_histogram(records, &dir.join("pm25_histogram.png"))?;
    city_risk_bar(dist, &dir.join("city_risk_bar.png"))?;
    hourly_pm25_trend(records, &dir.join("hourly_pm25_trend.png"))?;
    severity_scatter(records, &dir.join("severity_scatter.png"))?;
    tracing::info!("All charts rendered");
    Ok(())
}

/// Distribution of PM2.5 concentration across every fetched row.
fn pm25_histogram(records: &[RemoteRecord], path: &Path) -> Result<()> {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.pm2_5)
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        tracing::warn!("No pm2_5 values to plot, skipping histogram");
        return Ok(());
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };
    let bin_width = span / HISTOGRAM_BINS as f64;

    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for v in &values {
        let idx = (((v - min) / bin_width) as usize).min(HISTOGRAM_BINS - 1);
        counts[idx] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(1);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Distribution of PM2.5 Concentration", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(min..(min + span), 0usize..(max_count + max_count / 10 + 1))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("PM2.5 (µg/m³)")
        .y_desc("Count")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, &count)| {
            let x0 = min + i as f64 * bin_width;
            let x1 = x0 + bin_width;
            Rectangle::new([(x0, 0), (x1, count)], RGBColor(120, 60, 170).filled())
        }))
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

/// Stacked count of risk flags per city.
fn city_risk_bar(dist: &BTreeMap<String, BTreeMap<String, usize>>, path: &Path) -> Result<()> {
    if dist.is_empty() {
        tracing::warn!("No risk distribution to plot, skipping bar chart");
        return Ok(());
    }

    let cities: Vec<&String> = dist.keys().collect();
    let mut flags: Vec<String> = dist
        .values()
        .flat_map(|counts| counts.keys().cloned())
        .collect();
    flags.sort();
    flags.dedup();

    let max_total = dist
        .values()
        .map(|counts| counts.values().sum::<usize>())
        .max()
        .unwrap_or(1);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Risk Level Distribution by City", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(0f64..cities.len() as f64, 0usize..(max_total + 1))
        .map_err(chart_err)?;

    let city_labels: Vec<String> = cities.iter().map(|c| c.to_string()).collect();
    chart
        .configure_mesh()
        .x_desc("City")
        .y_desc("Count of Hours")
        .x_labels(cities.len())
        .x_label_formatter(&move |x| {
            city_labels
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(chart_err)?;

    for (flag_idx, flag) in flags.iter().enumerate() {
        let color = risk_color(flag);
        let series = chart
            .draw_series(cities.iter().enumerate().filter_map(|(i, city)| {
                let counts = &dist[*city];
                let below: usize = flags[..flag_idx]
                    .iter()
                    .map(|f| counts.get(f).copied().unwrap_or(0))
                    .sum();
                let height = counts.get(flag).copied().unwrap_or(0);
                if height == 0 {
                    return None;
                }
                let x0 = i as f64 + 0.15;
                let x1 = i as f64 + 0.85;
                Some(Rectangle::new(
                    [(x0, below), (x1, below + height)],
                    color.filled(),
                ))
            }))
            .map_err(chart_err)?;
        series
            .label(flag.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

/// Mean PM2.5 per hour of day, one line per city.
fn hourly_pm25_trend(records: &[RemoteRecord], path: &Path) -> Result<()> {
    let mut by_city: BTreeMap<String, BTreeMap<i64, (f64, usize)>> = BTreeMap::new();
    for record in records {
        let (Some(city), Some(hour), Some(pm2_5)) = (&record.city, record.hour, record.pm2_5)
        else {
            continue;
        };
        if !pm2_5.is_finite() {
            continue;
        }
        let entry = by_city
            .entry(city.clone())
            .or_default()
            .entry(hour as i64)
            .or_insert((0.0, 0));
        entry.0 += pm2_5;
        entry.1 += 1;
    }
    if by_city.is_empty() {
        tracing::warn!("No hourly pm2_5 data to plot, skipping trend chart");
        return Ok(());
    }

    let max_mean = by_city
        .values()
        .flat_map(|hours| hours.values().map(|(sum, n)| sum / *n as f64))
        .fold(0.0f64, f64::max);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Hourly Average PM2.5 Trends", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(0i64..23i64, 0f64..(max_mean * 1.1 + 1.0))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Hour of Day (0-23)")
        .y_desc("PM2.5 (µg/m³)")
        .draw()
        .map_err(chart_err)?;

    for (idx, (city, hours)) in by_city.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let points: Vec<(i64, f64)> = hours
            .iter()
            .map(|(hour, (sum, n))| (*hour, sum / *n as f64))
            .collect();

        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(chart_err)?
            .label(city.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 15, y)], color.stroke_width(2))
            });

        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
            )
            .map_err(chart_err)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

/// Severity score against PM2.5, colored by risk flag.
fn severity_scatter(records: &[RemoteRecord], path: &Path) -> Result<()> {
    let points: Vec<(f64, f64, &str)> = records
        .iter()
        .filter_map(|r| {
            let pm2_5 = r.pm2_5.filter(|v| v.is_finite())?;
            let severity = r.severity_score.filter(|v| v.is_finite())?;
            Some((pm2_5, severity, r.risk_flag.as_deref().unwrap_or("")))
        })
        .collect();
    if points.is_empty() {
        tracing::warn!("No severity/pm2_5 pairs to plot, skipping scatter");
        return Ok(());
    }

    let max_x = points.iter().map(|p| p.0).fold(0.0f64, f64::max);
    let max_y = points.iter().map(|p| p.1).fold(0.0f64, f64::max);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Severity Score vs PM2.5", ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(45)
        .y_label_area_size(65)
        .build_cartesian_2d(0f64..(max_x * 1.05 + 1.0), 0f64..(max_y * 1.05 + 1.0))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("PM2.5 (µg/m³)")
        .y_desc("Severity Score")
        .draw()
        .map_err(chart_err)?;

    for flag in ["Low Risk", "Moderate Risk", "High Risk"] {
        let color = risk_color(flag);
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|(_, _, f)| *f == flag)
                    .map(|&(x, y, _)| Circle::new((x, y), 3, color.mix(0.7).filled())),
            )
            .map_err(chart_err)?
            .label(flag)
            .legend(move |(x, y)| Circle::new((x + 5, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8).filled())
        .border_style(BLACK.stroke_width(1))
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(city: &str, hour: f64, pm2_5: f64, severity: f64, flag: &str) -> RemoteRecord {
        RemoteRecord {
            city: Some(city.to_string()),
            hour: Some(hour),
            pm2_5: Some(pm2_5),
            severity_score: Some(severity),
            risk_flag: Some(flag.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_all_writes_four_pngs() {
        let dir = TempDir::new().unwrap();
        let records: Vec<RemoteRecord> = (0..48)
            .map(|i| {
                let flag = if i % 3 == 0 { "High Risk" } else { "Low Risk" };
                record("Delhi", (i % 24) as f64, 20.0 + i as f64, 100.0 + 10.0 * i as f64, flag)
            })
            .collect();
        let dist = crate::analyzers::metrics::risk_distribution(&records);

        render_all(&records, &dist, dir.path()).unwrap();

        for name in [
            "pm25_histogram.png",
            "city_risk_bar.png",
            "hourly_pm25_trend.png",
            "severity_scatter.png",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
    }

    #[test]
    fn test_charts_skip_gracefully_on_empty_data() {
        let dir = TempDir::new().unwrap();
        let dist = BTreeMap::new();

        render_all(&[], &dist, dir.path()).unwrap();
        assert!(!dir.path().join("pm25_histogram.png").exists());
    }
}
