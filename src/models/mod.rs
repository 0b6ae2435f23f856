pub mod city;
pub mod measurement;

pub use city::{default_cities, City};
pub use measurement::{AqiCategory, HourlyRecord, RiskLevel};
