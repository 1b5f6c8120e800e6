use super::types::{DeviceRecord, Metrics, RawSnapshot};
use crate::error::ReadingError;

pub fn primary_record(snapshot: &RawSnapshot) -> Result<&DeviceRecord, ReadingError> {
    snapshot.results.first().ok_or(ReadingError::MissingRecord)
}

/// Decodes the JSON document embedded as text in the first record's `Stats` field.
pub fn extract_metrics(snapshot: &RawSnapshot) -> Result<Metrics, ReadingError> {
    let record = primary_record(snapshot)?;

    let stats = match record.stats.as_deref().map(str::trim) {
        Some(stats) if !stats.is_empty() => stats,
        _ => {
            return Err(ReadingError::MalformedMetrics(
                "Stats field is missing or empty".to_string(),
            ))
        }
    };

    serde_json::from_str(stats).map_err(|e| ReadingError::MalformedMetrics(e.to_string()))
}
