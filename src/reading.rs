use crate::aqi::Category;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A computed sensor reading, shared read-only between callers until it expires.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub aqi_score: f64,
    pub category: Category,
    pub temperature_c: f64,
    pub humidity: String,
    pub pressure: String,
    pub uptime: String,
    pub computed_at: DateTime<Utc>,
}
