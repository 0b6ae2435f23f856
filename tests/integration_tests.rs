use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

use atmostrack::loaders::batch_loader::{read_staged_rows, to_remote_record};
use atmostrack::loaders::{BatchLoader, SupabaseClient, BATCH_SIZE};
use atmostrack::models::RiskLevel;
use atmostrack::transformers::Transformer;
use atmostrack::utils::retry::RetryPolicy;

/// Build a raw capture for one city with 24 hourly rows. Hours listed in
/// `missing_hours` get null for every pollutant.
fn write_raw_city(
    dir: &TempDir,
    city: &str,
    missing_hours: &[usize],
    timestamp: &str,
) -> PathBuf {
    let times: Vec<Value> = (0..24)
        .map(|h| json!(format!("2026-03-01T{:02}:00", h)))
        .collect();
    let series = |base: f64| -> Vec<Value> {
        (0..24)
            .map(|h| {
                if missing_hours.contains(&h) {
                    Value::Null
                } else {
                    json!(base + h as f64)
                }
            })
            .collect::<Vec<Value>>()
    };

    let payload = json!({
        "city_name": city,
        "hourly": {
            "time": times,
            "pm10": series(30.0),
            "pm2_5": series(20.0),
            "carbon_monoxide": series(400.0),
            "nitrogen_dioxide": series(25.0),
            "sulphur_dioxide": series(8.0),
            "ozone": series(50.0),
            "uv_index": series(1.0),
        }
    });

    let path = dir
        .path()
        .join(format!("{}_raw_{}.json", city.to_lowercase(), timestamp));
    std::fs::write(&path, serde_json::to_string_pretty(&payload).unwrap()).unwrap();
    path
}

#[test]
fn test_two_city_run_stages_45_rows_in_one_batch() {
    let raw_dir = TempDir::new().unwrap();
    let staged_dir = TempDir::new().unwrap();
    let timestamp = "20260301_120000";

    let files = vec![
        write_raw_city(&raw_dir, "Delhi", &[], timestamp),
        write_raw_city(&raw_dir, "Mumbai", &[3, 11, 19], timestamp),
    ];

    let transformer = Transformer::new(staged_dir.path());
    let staged = transformer.run(&files, timestamp).unwrap().unwrap();
    assert_eq!(
        staged.file_name().unwrap().to_str().unwrap(),
        "air_quality_transform_20260301_120000.csv"
    );

    // 24 full hours + 21 with the all-missing hours dropped
    let rows = read_staged_rows(&staged).unwrap();
    assert_eq!(rows.len(), 45);

    // File-list order preserved: Delhi first, then Mumbai
    assert_eq!(rows[0].city.as_deref(), Some("Delhi"));
    assert_eq!(rows[24].city.as_deref(), Some("Mumbai"));

    // Mumbai hour 3 was dropped, hour 4 follows hour 2
    let mumbai_hours: Vec<i64> = rows[24..].iter().filter_map(|r| r.hour).collect();
    assert!(mumbai_hours.windows(2).all(|w| w[0] < w[1]));
    assert!(!mumbai_hours.contains(&3));
    assert!(!mumbai_hours.contains(&11));
    assert!(!mumbai_hours.contains(&19));

    // Loading 45 sanitized rows at batch size 200 is a single insert call
    let records: Vec<Value> = rows.iter().map(to_remote_record).collect();
    let batches: Vec<&[Value]> = records.chunks(BATCH_SIZE).collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 45);
}

#[test]
fn test_staged_rows_survive_sanitization_with_rename() {
    let raw_dir = TempDir::new().unwrap();
    let staged_dir = TempDir::new().unwrap();
    let timestamp = "20260301_120000";

    let files = vec![write_raw_city(&raw_dir, "Delhi", &[], timestamp)];
    let staged = Transformer::new(staged_dir.path())
        .run(&files, timestamp)
        .unwrap()
        .unwrap();

    let rows = read_staged_rows(&staged).unwrap();
    let record = to_remote_record(&rows[0]);

    assert_eq!(record["city"], "Delhi");
    assert_eq!(record["time"], "2026-03-01T00:00:00");
    assert_eq!(record["hour"], 0);
    assert!(record["risk_flag"].is_string());
    assert!(record.get("risk_classification").is_none());
    assert!(record["severity_score"].is_number());
}

#[test]
fn test_severity_boundary_classification_end_to_end() {
    let raw_dir = TempDir::new().unwrap();
    let staged_dir = TempDir::new().unwrap();
    let timestamp = "20260301_130000";

    // Weights: 5*pm2_5 + 3*pm10 + 4*no2 + 4*so2 + 2*co + 3*o3.
    // First hour: 150 + 150 + 20 + 20 + 60 + 0 = 400 exactly; the second
    // hour's pm2_5 bump adds 5*0.2 = 1, landing on 401.
    let payload = json!({
        "city_name": "Hyderabad",
        "hourly": {
            "time": ["2026-03-01T00:00", "2026-03-01T01:00"],
            "pm10": [50.0, 50.0],
            "pm2_5": [30.0, 30.2],
            "carbon_monoxide": [30.0, 30.0],
            "nitrogen_dioxide": [5.0, 5.0],
            "sulphur_dioxide": [5.0, 5.0],
            "ozone": [0.0, 0.0],
            "uv_index": [0.0, 0.0],
        }
    });
    let path = raw_dir.path().join("hyderabad_raw_20260301_130000.json");
    std::fs::write(&path, payload.to_string()).unwrap();

    let staged = Transformer::new(staged_dir.path())
        .run(&[path], timestamp)
        .unwrap()
        .unwrap();

    let rows = read_staged_rows(&staged).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].severity_score, Some(400.0));
    assert_eq!(rows[0].risk_classification.as_deref(), Some("Moderate Risk"));
    assert_eq!(rows[1].severity_score, Some(401.0));
    assert_eq!(rows[1].risk_classification.as_deref(), Some("High Risk"));
}

/// Local HTTP endpoint answering each request with the next scripted status
/// code, counting requests as they arrive.
fn spawn_insert_endpoint(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);

    std::thread::spawn(move || {
        for status in statuses {
            let (mut stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };
            drain_request(&mut stream);
            counter.fetch_add(1, Ordering::SeqCst);
            let reason = if status < 400 {
                "Created"
            } else {
                "Internal Server Error"
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (base_url, served)
}

/// Read the full request (headers plus content-length body) so the client
/// never sees the connection close mid-send.
fn drain_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut body_start = None;
    let mut content_length = 0usize;

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        if body_start.is_none() {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                body_start = Some(pos + 4);
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
            }
        }
        if let Some(start) = body_start {
            if buf.len() >= start + content_length {
                return;
            }
        }
    }
}

#[tokio::test]
async fn test_load_skips_failed_batch_and_continues() {
    let staged_dir = TempDir::new().unwrap();
    let staged = staged_dir
        .path()
        .join("air_quality_transform_20260301_140000.csv");

    let mut csv = String::from(
        "city,time,hour,pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,\
         sulphur_dioxide,ozone,uv_index,aqi_category,severity_score,\
         risk_classification\n",
    );
    for i in 0..250 {
        csv.push_str(&format!(
            "Delhi,2026-03-01T{:02}:00:00,{},30.0,20.0,400.0,25.0,8.0,50.0,1.0,\
             Unhealthy,1157.0,High Risk\n",
            i % 24,
            i % 24
        ));
    }
    std::fs::write(&staged, csv).unwrap();

    // First batch of 200 burns all three attempts on server errors; the
    // trailing batch of 50 succeeds on its first attempt.
    let (base_url, served) = spawn_insert_endpoint(vec![500, 500, 500, 201]);
    let client = SupabaseClient::new(base_url, "test-key").unwrap();
    let loader = BatchLoader::new(&client, "air_quality_data")
        .with_retry(RetryPolicy::immediate(2))
        .with_silent(true);

    let report = loader.run(&staged).await.unwrap();
    assert_eq!(report.total_rows, 250);
    assert_eq!(report.inserted_rows, 50);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(served.load(Ordering::SeqCst), 4);
}

#[test]
fn test_risk_labels_match_remote_vocabulary() {
    // The staged CSV vocabulary must round-trip through serde so the
    // analyzer's counts line up with the loader's renamed column.
    for (level, label) in [
        (RiskLevel::Low, "Low Risk"),
        (RiskLevel::Moderate, "Moderate Risk"),
        (RiskLevel::High, "High Risk"),
    ] {
        let json = serde_json::to_string(&level).unwrap();
        assert_eq!(json, format!("\"{}\"", label));
    }
}
