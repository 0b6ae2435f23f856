pub mod charts;
pub mod metrics;

pub use metrics::{Analyzer, RemoteRecord, SummaryMetrics};
