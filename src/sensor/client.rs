use super::types::RawSnapshot;
use crate::error::ReadingError;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// Anything that can produce a raw snapshot for a sensor id.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(
        &self,
        sensor_id: &str,
    ) -> impl Future<Output = Result<RawSnapshot, ReadingError>> + Send;
}

pub struct SensorClient {
    client: Client,
    base_url: String,
}

impl SensorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent("PurpleAirAqiBot/1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl SnapshotSource for SensorClient {
    async fn fetch(&self, sensor_id: &str) -> Result<RawSnapshot, ReadingError> {
        tracing::debug!("Fetching PurpleAir snapshot for sensor {}", sensor_id);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("show", sensor_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReadingError::Network(format!("HTTP {}", status)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ReadingError::Decode(e.to_string()))
    }
}
