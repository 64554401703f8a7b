use chrono::{DateTime, Duration, Utc};

use crate::utils::age_display;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
    pub validity: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, fetched_at: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            payload,
            fetched_at,
            validity,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// Fresh while strictly younger than the validity window.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.validity
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        age_display(self.age(now))
    }
}
