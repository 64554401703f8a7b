use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use super::CacheEntry;
use crate::clock::Clock;
use crate::storage::KvStore;

/// Suffix of the key holding the fetch timestamp.
const TIMESTAMP_SUFFIX: &str = "_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Fetched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub entry: CacheEntry<T>,
    pub source: LoadSource,
}

/// The fetcher failed. Carries whatever entry was persisted before, fresh or
/// not, so the caller can decide between serving it and reporting the outage.
#[derive(Debug)]
pub struct FetchFailed<T, E> {
    pub error: E,
    pub stale: Option<CacheEntry<T>>,
}

/// Serves persisted entries while fresh, refetches otherwise.
///
/// Holds no state between calls besides what is in the store. Callers must
/// not start a second load for the same key while one is in flight.
#[derive(Clone)]
pub struct FreshnessLoader {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl FreshnessLoader {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn timestamp_key(key: &str) -> String {
        format!("{}{}", key, TIMESTAMP_SUFFIX)
    }

    /// Read the persisted entry regardless of age. Missing or unreadable
    /// entries come back as `None`.
    pub fn peek<T: DeserializeOwned>(&self, key: &str, validity: Duration) -> Option<CacheEntry<T>> {
        let payload = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(cache = key, error = %e, "Failed to read cached payload");
                return None;
            }
        };

        let fetched_at = match self.store.get(&Self::timestamp_key(key)) {
            Ok(Some(raw)) => match parse_millis(&raw) {
                Some(ts) => ts,
                None => {
                    debug!(cache = key, raw = %raw, "Unparseable cache timestamp");
                    return None;
                }
            },
            Ok(None) => return None,
            Err(e) => {
                warn!(cache = key, error = %e, "Failed to read cache timestamp");
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(payload) => Some(CacheEntry::new(payload, fetched_at, validity)),
            Err(e) => {
                warn!(cache = key, error = %e, "Failed to parse cached payload");
                None
            }
        }
    }

    /// Persist `payload` as fetched now. Write failures are logged; the
    /// entry is returned either way.
    pub fn save<T: Serialize>(&self, key: &str, payload: T, validity: Duration) -> CacheEntry<T> {
        let now = self.clock.now();
        match serde_json::to_string(&payload) {
            Ok(json) => {
                let written = self
                    .store
                    .set(key, &json)
                    .and_then(|_| {
                        self.store
                            .set(&Self::timestamp_key(key), &now.timestamp_millis().to_string())
                    });
                if let Err(e) = written {
                    error!(cache = key, error = %e, "Failed to persist cache entry");
                }
            }
            Err(e) => error!(cache = key, error = %e, "Failed to encode cache entry"),
        }
        CacheEntry::new(payload, now, validity)
    }

    /// Serve the entry under `key` if fresh, otherwise run `fetcher`, persist
    /// its result and serve that.
    pub async fn load<T, E, F, Fut>(
        &self,
        key: &str,
        validity: Duration,
        fetcher: F,
    ) -> Result<Loaded<T>, FetchFailed<T, E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let existing = self.peek::<T>(key, validity);
        let now = self.clock.now();

        if let Some(entry) = existing {
            if entry.is_fresh_at(now) {
                info!(cache = key, age = %entry.age_display(now), "Serving cached resource");
                return Ok(Loaded {
                    entry,
                    source: LoadSource::Cache,
                });
            }
            debug!(cache = key, "Cached resource is stale, refetching");
            return self.fetch_and_store(key, validity, fetcher, Some(entry)).await;
        }

        debug!(cache = key, "No cached resource, fetching");
        self.fetch_and_store(key, validity, fetcher, None).await
    }

    /// Fetch regardless of freshness. On failure the persisted entry, if
    /// any, is handed back as stale.
    pub async fn refresh<T, E, F, Fut>(
        &self,
        key: &str,
        validity: Duration,
        fetcher: F,
    ) -> Result<Loaded<T>, FetchFailed<T, E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let existing = self.peek::<T>(key, validity);
        self.fetch_and_store(key, validity, fetcher, existing).await
    }

    async fn fetch_and_store<T, E, F, Fut>(
        &self,
        key: &str,
        validity: Duration,
        fetcher: F,
        stale: Option<CacheEntry<T>>,
    ) -> Result<Loaded<T>, FetchFailed<T, E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match fetcher().await {
            Ok(payload) => {
                let entry = self.save(key, payload, validity);
                info!(cache = key, "Loaded fresh resource");
                Ok(Loaded {
                    entry,
                    source: LoadSource::Fetched,
                })
            }
            Err(error) => Err(FetchFailed { error, stale }),
        }
    }
}

fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
