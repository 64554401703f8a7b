//! Freshness-gated caching of remote resources.
//!
//! A `CacheEntry` pairs a payload with the time it was fetched and the window
//! during which it may be served. `FreshnessLoader` serves a persisted entry
//! while it is fresh and refetches once it is not. The payload is stored under
//! the resource key and the fetch time (epoch milliseconds) under
//! `<key>_time`, the layout the browser dashboard used.

pub mod entry;
pub mod loader;

pub use entry::CacheEntry;
pub use loader::{FetchFailed, FreshnessLoader, LoadSource, Loaded};
