//! Single-slot reading cache with lazy expiry and single-flight refresh.
//!
//! A miss starts one refresh on the runtime and publishes it through a
//! `watch` channel; every caller that misses while it runs waits on the same
//! channel and gets the same outcome. The slot mutex is never held across an
//! `.await`.

use crate::error::ReadingError;
use crate::reading::Reading;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

type Outcome = Result<Arc<Reading>, ReadingError>;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub reading: Arc<Reading>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(reading: Arc<Reading>, ttl: Duration) -> Self {
        let expires_at = reading.computed_at + ttl;
        Self {
            reading,
            expires_at,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Empty,
    Fresh,
    Stale,
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<watch::Receiver<Option<Outcome>>>,
}

impl Slot {
    // A refresh only ever replaces an entry with an equal or newer reading.
    fn store(&mut self, entry: CacheEntry) {
        let newer_present = self
            .entry
            .as_ref()
            .is_some_and(|current| current.reading.computed_at > entry.reading.computed_at);

        if !newer_present {
            self.entry = Some(entry);
        }
    }
}

pub struct ReadingCache {
    ttl: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl ReadingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current entry, fresh or not.
    pub fn peek(&self) -> Option<CacheEntry> {
        lock(&self.slot).entry.clone()
    }

    pub fn state(&self, now: DateTime<Utc>) -> SlotState {
        match &lock(&self.slot).entry {
            None => SlotState::Empty,
            Some(entry) if entry.is_fresh(now) => SlotState::Fresh,
            Some(_) => SlotState::Stale,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.slot).in_flight.is_some()
    }

    /// Returns the cached reading if it is still fresh at `now`, otherwise
    /// joins the in-flight refresh or starts one with `refresh`.
    ///
    /// A failed refresh leaves the slot untouched and clears the in-flight
    /// marker, so the next call retries.
    pub async fn get_or_refresh<F, Fut>(&self, now: DateTime<Utc>, refresh: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Reading, ReadingError>> + Send + 'static,
    {
        let mut rx = {
            let mut slot = lock(&self.slot);

            if let Some(entry) = slot.entry.as_ref().filter(|entry| entry.is_fresh(now)) {
                tracing::debug!("Reading cache hit, expires at {}", entry.expires_at);
                return Ok(Arc::clone(&entry.reading));
            }

            match &slot.in_flight {
                Some(rx) => {
                    tracing::debug!("Reading refresh already in flight, joining it");
                    rx.clone()
                }
                None => self.start_refresh(&mut slot, refresh()),
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|published| (*published).clone());

        match outcome {
            Some(outcome) => outcome,
            None => {
                // the refresh task died before publishing
                let mut slot = lock(&self.slot);
                if slot
                    .in_flight
                    .as_ref()
                    .is_some_and(|current| current.same_channel(&rx))
                {
                    slot.in_flight = None;
                }
                Err(ReadingError::RefreshAborted)
            }
        }
    }

    fn start_refresh<Fut>(&self, slot: &mut Slot, refresh: Fut) -> watch::Receiver<Option<Outcome>>
    where
        Fut: Future<Output = Result<Reading, ReadingError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        slot.in_flight = Some(rx.clone());

        // clears the marker however the task ends, panics included
        let marker = InFlight {
            slot: Arc::clone(&self.slot),
            rx: rx.clone(),
        };
        let ttl = self.ttl;

        tracing::info!("Reading cache miss, refreshing from sensor");

        tokio::spawn(async move {
            let outcome = refresh.await.map(Arc::new);

            match &outcome {
                Ok(reading) => {
                    tracing::debug!("Reading refreshed, AQI {}", reading.aqi_score);
                    lock(&marker.slot).store(CacheEntry::new(Arc::clone(reading), ttl));
                }
                Err(e) => tracing::warn!("Reading refresh failed: {}", e),
            }
            drop(marker);

            // no receivers left just means every caller went away
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}

struct InFlight {
    slot: Arc<Mutex<Slot>>,
    rx: watch::Receiver<Option<Outcome>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.rx))
        {
            slot.in_flight = None;
        }
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
