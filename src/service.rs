use crate::aqi;
use crate::cache::ReadingCache;
use crate::error::ReadingError;
use crate::reading::Reading;
use crate::sensor::{extract_metrics, primary_record, RawSnapshot, SnapshotSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Composes fetch, extraction and AQI computation behind the reading cache.
pub struct ReadingService<S: SnapshotSource> {
    source: Arc<S>,
    cache: Arc<ReadingCache>,
    clock: Arc<dyn Clock>,
    sensor_id: String,
}

impl<S: SnapshotSource> ReadingService<S> {
    pub fn new(
        source: Arc<S>,
        cache: Arc<ReadingCache>,
        clock: Arc<dyn Clock>,
        sensor_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cache,
            clock,
            sensor_id: sensor_id.into(),
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn cache(&self) -> &ReadingCache {
        &self.cache
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn get_reading(&self) -> Result<Arc<Reading>, ReadingError> {
        let source = Arc::clone(&self.source);
        let clock = Arc::clone(&self.clock);
        let sensor_id = self.sensor_id.clone();

        self.cache
            .get_or_refresh(self.clock.now(), move || async move {
                let snapshot = source.fetch(&sensor_id).await?;
                build_reading(&snapshot, clock.now())
            })
            .await
    }
}

pub fn build_reading(
    snapshot: &RawSnapshot,
    computed_at: DateTime<Utc>,
) -> Result<Reading, ReadingError> {
    let record = primary_record(snapshot)?;
    let metrics = extract_metrics(snapshot)?;
    let aqi = aqi::compute(metrics.short_window_pm25())?;

    let temp_f = record
        .temp_f
        .as_deref()
        .ok_or_else(|| ReadingError::InvalidTemperature(String::new()))?;
    let temperature_c = aqi::fahrenheit_to_celsius(temp_f)?;

    Ok(Reading {
        aqi_score: aqi.score,
        category: aqi.category,
        temperature_c,
        humidity: record.humidity.clone().unwrap_or_default(),
        pressure: record.pressure.clone().unwrap_or_default(),
        uptime: record.uptime.clone().unwrap_or_default(),
        computed_at,
    })
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::sensor::types::DeviceRecord;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    pub fn snapshot(temp_f: &str, stats: &str) -> RawSnapshot {
        RawSnapshot {
            map_version: Some("0.18".to_string()),
            base_version: Some("7".to_string()),
            results: vec![DeviceRecord {
                id: Some(49489),
                label: Some("Borshchahivka".to_string()),
                temp_f: Some(temp_f.to_string()),
                humidity: Some("41".to_string()),
                pressure: Some("998.7".to_string()),
                uptime: Some("86400".to_string()),
                stats: Some(stats.to_string()),
                ..Default::default()
            }],
        }
    }

    /// Scripted snapshot source that counts fetches.
    pub struct FakeSource {
        responses: Mutex<VecDeque<Result<RawSnapshot, ReadingError>>>,
        fallback: Result<RawSnapshot, ReadingError>,
        delay: Duration,
        pub calls: AtomicUsize,
    }

    impl FakeSource {
        pub fn always(response: Result<RawSnapshot, ReadingError>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: response,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn scripted(
            script: Vec<Result<RawSnapshot, ReadingError>>,
            fallback: Result<RawSnapshot, ReadingError>,
        ) -> Self {
            Self {
                responses: Mutex::new(script.into()),
                ..Self::always(fallback)
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SnapshotSource for FakeSource {
        async fn fetch(&self, _sensor_id: &str) -> Result<RawSnapshot, ReadingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.responses.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.fallback.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::aqi::Category;
    use std::time::Duration;

    const STATS: &str = r#"{"v":30.2,"v1":35.4,"v2":33.0,"v3":31.8,"v4":29.9,"v5":25.0,"v6":20.1,"pm":30.2}"#;

    fn service(
        source: FakeSource,
        clock: Arc<ManualClock>,
    ) -> (Arc<ReadingService<FakeSource>>, Arc<FakeSource>) {
        let source = Arc::new(source);
        let cache = Arc::new(ReadingCache::new(chrono::Duration::minutes(2)));
        let service = ReadingService::new(Arc::clone(&source), cache, clock, "49489");
        (Arc::new(service), source)
    }

    #[tokio::test]
    async fn test_pipeline_builds_reading() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (service, source) = service(FakeSource::always(Ok(snapshot("77.0", STATS))), clock);

        let reading = service.get_reading().await.unwrap();

        assert!((reading.temperature_c - 25.0).abs() < 0.01);
        assert_eq!(reading.aqi_score, 100.0);
        assert_eq!(reading.category, Category::Moderate);
        assert_eq!(reading.humidity, "41");
        assert_eq!(reading.pressure, "998.7");
        assert_eq!(reading.uptime, "86400");
        assert_eq!(reading.computed_at, t0());
        assert_eq!(source.calls(), 1);
        assert_eq!(service.sensor_id(), "49489");
    }

    #[tokio::test]
    async fn test_cached_within_window() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (service, source) = service(
            FakeSource::always(Ok(snapshot("77.0", STATS))),
            Arc::clone(&clock),
        );

        let first = service.get_reading().await.unwrap();
        clock.advance(chrono::Duration::seconds(90));
        let second = service.get_reading().await.unwrap();

        assert_eq!(*first, *second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls(), 1);

        clock.advance(chrono::Duration::seconds(30));
        let third = service.get_reading().await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(third.computed_at, t0() + chrono::Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_concurrent_callers_fetch_once() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (service, source) = service(
            FakeSource::always(Ok(snapshot("68", STATS))).with_delay(Duration::from_millis(50)),
            clock,
        );

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.get_reading().await })
            })
            .collect();

        let mut readings = Vec::new();
        for handle in handles {
            readings.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(source.calls(), 1);
        assert!(readings.iter().all(|r| Arc::ptr_eq(r, &readings[0])));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_error() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (service, source) = service(
            FakeSource::always(Err(ReadingError::Network("timed out".to_string())))
                .with_delay(Duration::from_millis(50)),
            clock,
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.get_reading().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                Err(ReadingError::Network("timed out".to_string()))
            );
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_retried_next_call() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (service, source) = service(
            FakeSource::scripted(
                vec![Err(ReadingError::Network("HTTP 502 Bad Gateway".to_string()))],
                Ok(snapshot("77.0", STATS)),
            ),
            clock,
        );

        assert!(matches!(service.get_reading().await, Err(ReadingError::Network(_))));
        assert!(service.get_reading().await.is_ok());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_stats_propagates() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (service, _) = service(FakeSource::always(Ok(snapshot("77.0", ""))), clock);

        let result = service.get_reading().await;

        assert!(matches!(result, Err(ReadingError::MalformedMetrics(_))));
        assert!(service.cache().peek().is_none());
    }

    #[test]
    fn test_missing_temperature_is_invalid() {
        let mut raw = snapshot("77.0", STATS);
        raw.results[0].temp_f = None;

        let result = build_reading(&raw, t0());
        assert!(matches!(result, Err(ReadingError::InvalidTemperature(_))));
    }

    #[test]
    fn test_bad_temperature_is_invalid() {
        let result = build_reading(&snapshot("n/a", STATS), t0());
        assert_eq!(result, Err(ReadingError::InvalidTemperature("n/a".to_string())));
    }

    #[test]
    fn test_negative_concentration_is_invalid() {
        let result = build_reading(&snapshot("77.0", r#"{"v":-3.0,"v1":-1.0}"#), t0());
        assert_eq!(result, Err(ReadingError::InvalidConcentration(-1.0)));
    }
}
