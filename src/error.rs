use thiserror::Error;

/// Failures of the reading pipeline.
///
/// `Clone` because one refresh outcome is handed to every caller that was
/// waiting on it, so upstream error sources are carried as text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    #[error("Sensor API unreachable: {0}")]
    Network(String),
    #[error("Sensor response decoding failed: {0}")]
    Decode(String),
    #[error("Sensor response contains no device records")]
    MissingRecord,
    #[error("Embedded metrics are malformed: {0}")]
    MalformedMetrics(String),
    #[error("Invalid PM2.5 concentration: {0}")]
    InvalidConcentration(f64),
    #[error("Invalid temperature: {0:?}")]
    InvalidTemperature(String),
    #[error("Refresh task ended without a result")]
    RefreshAborted,
}

impl From<reqwest::Error> for ReadingError {
    fn from(err: reqwest::Error) -> Self {
        ReadingError::Network(err.to_string())
    }
}
