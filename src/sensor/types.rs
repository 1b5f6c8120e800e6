use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    #[serde(rename = "mapVersion", default)]
    pub map_version: Option<String>,
    #[serde(rename = "baseVersion", default)]
    pub base_version: Option<String>,
    pub results: Vec<DeviceRecord>,
}

// PurpleAir omits most fields when a channel has no value, hence the Options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "ID", default)]
    pub id: Option<i64>,
    #[serde(rename = "Label", default)]
    pub label: Option<String>,
    #[serde(rename = "Lat", default)]
    pub lat: Option<f64>,
    #[serde(rename = "Lon", default)]
    pub lon: Option<f64>,
    #[serde(rename = "PM2_5Value", default)]
    pub pm2_5_value: Option<String>,
    #[serde(rename = "LastSeen", default)]
    pub last_seen: Option<i64>,
    #[serde(rename = "Uptime", default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub humidity: Option<String>,
    #[serde(default)]
    pub temp_f: Option<String>,
    #[serde(default)]
    pub pressure: Option<String>,
    #[serde(rename = "Stats", default)]
    pub stats: Option<String>,
}

/// Averaged PM2.5 readings carried in the `Stats` string of a device record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Metrics {
    /// Instantaneous value.
    pub v: f64,
    /// 10 minute average.
    pub v1: f64,
    #[serde(default)]
    pub v2: Option<f64>,
    #[serde(default)]
    pub v3: Option<f64>,
    #[serde(default)]
    pub v4: Option<f64>,
    #[serde(default)]
    pub v5: Option<f64>,
    #[serde(default)]
    pub v6: Option<f64>,
    #[serde(default)]
    pub pm: Option<f64>,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<i64>,
    #[serde(rename = "timeSinceModified", default)]
    pub time_since_modified: Option<i64>,
}

impl Metrics {
    /// The concentration the AQI is computed from.
    pub fn short_window_pm25(&self) -> f64 {
        self.v1
    }
}
