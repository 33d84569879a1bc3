//! Shared plumbing for read-only upstream APIs: retry with exponential
//! backoff and a small TTL cache.

use crate::error::{ModexoError, Result};
use dashmap::DashMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry an async operation with exponential backoff.
///
/// Only errors for which [`ModexoError::is_retryable`] holds are retried.
pub async fn retry_async<F, Fut, T>(mut op: F, attempts: u32, initial_delay: Duration) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && e.is_retryable() => {
                debug!("Attempt {}/{} failed: {}; retrying in {:?}", attempt, attempts, e, delay);
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// GET a JSON document, retrying transient failures
pub async fn fetch_with_retry<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    attempts: u32,
    base_delay: Duration,
) -> Result<T> {
    retry_async(
        |attempt| async move {
            let resp = http.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                if attempt > 1 || status.as_u16() != 404 {
                    warn!("GET {} returned {} (attempt {})", url, status, attempt);
                }
                return Err(ModexoError::UpstreamStatus {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(resp.json::<T>().await?)
        },
        attempts,
        base_delay,
    )
    .await
}

/// Concurrent cache whose entries expire after a fixed TTL
pub struct TtlCache<V> {
    ttl: Duration,
    entries: DashMap<String, (Instant, V)>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let fresh = {
            let entry = self.entries.get(key)?;
            let (stored_at, value) = entry.value();
            (stored_at.elapsed() < self.ttl).then(|| value.clone())
        };
        if fresh.is_none() {
            self.entries
                .remove_if(key, |_, (stored_at, _)| stored_at.elapsed() >= self.ttl);
        }
        fresh
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), (Instant::now(), value));
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
