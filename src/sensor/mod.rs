pub mod client;
pub mod extract;
pub mod types;

pub use client::{SensorClient, SnapshotSource};
pub use extract::{extract_metrics, primary_record};
pub use types::RawSnapshot;
