//! Process-local seen-set for webhook event ids.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use affsync_core::{EventDedupStore, StoreError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Event ids with the instant they expire.
#[derive(Debug, Default)]
pub struct InMemoryEventCache {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryEventCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl EventDedupStore for InMemoryEventCache {
    async fn seen(&self, event_id: &str) -> Result<bool, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(event_id)
            .is_some_and(|expires| *expires > Instant::now()))
    }

    async fn mark_seen(&self, event_id: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(event_id).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }
        entries.insert(event_id.to_string(), now + ttl);
        Ok(true)
    }

    async fn evict_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, expires| *expires > now);
        Ok(before - entries.len())
    }
}

/// Evict expired ids from `store` every `interval` until the task is aborted.
pub fn spawn_eviction(store: Arc<dyn EventDedupStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.evict_expired().await {
                Ok(0) => {}
                Ok(evicted) => tracing::debug!(evicted, "evicted expired webhook event ids"),
                Err(e) => tracing::warn!(error = %e, "webhook event id eviction failed"),
            }
        }
    })
}
