//! Optional device capabilities: network reachability and position.
//!
//! Either may be missing on the machine running the console. A missing
//! capability never fails the session; it is reported only when the user
//! asks for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::Feature;
use crate::models::Location;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{0:?} is disabled")]
    Disabled(Feature),

    #[error("Location services are not available on this device")]
    Unavailable,

    #[error("Timed out waiting for {0}")]
    TimedOut(&'static str),
}

// ============================================================================
// Connectivity
// ============================================================================

pub trait ConnectivityProbe: Send + Sync {
    /// Whether the network is reachable right now.
    fn check(&self) -> BoxFuture<'_, bool>;
}

/// Reports a fixed answer that can be flipped, for hosts without a probe
/// endpoint and for tests.
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for StaticProbe {
    fn check(&self) -> BoxFuture<'_, bool> {
        let online = self.online.load(Ordering::SeqCst);
        async move { online }.boxed()
    }
}

/// Online when a HEAD request to `url` gets any HTTP response.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

impl ConnectivityProbe for HttpProbe {
    fn check(&self) -> BoxFuture<'_, bool> {
        async move {
            match self.client.head(&self.url).send().await {
                Ok(_) => true,
                Err(e) => {
                    debug!(url = %self.url, error = %e, "Connectivity probe failed");
                    false
                }
            }
        }
        .boxed()
    }
}

// ============================================================================
// Location
// ============================================================================

pub trait LocationProvider: Send + Sync {
    fn current(&self) -> BoxFuture<'_, Result<Location, CapabilityError>>;
}

/// Serves a configured position, or reports location as unavailable.
#[derive(Debug, Default)]
pub struct FixedLocation {
    location: Mutex<Option<Location>>,
}

impl FixedLocation {
    pub fn new(location: Option<Location>) -> Self {
        Self {
            location: Mutex::new(location),
        }
    }

    /// Parse `"lat,lng"` or `"lat,lng,accuracy"`.
    pub fn parse(s: &str) -> Option<Location> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [lat, lng] => Some(Location {
                lat: *lat,
                lng: *lng,
                accuracy: 0.0,
            }),
            [lat, lng, accuracy] => Some(Location {
                lat: *lat,
                lng: *lng,
                accuracy: *accuracy,
            }),
            _ => None,
        }
    }

    pub fn set(&self, location: Option<Location>) {
        if let Ok(mut current) = self.location.lock() {
            *current = location;
        }
    }
}

impl LocationProvider for FixedLocation {
    fn current(&self) -> BoxFuture<'_, Result<Location, CapabilityError>> {
        let location = self.location.lock().ok().and_then(|l| *l);
        async move { location.ok_or(CapabilityError::Unavailable) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_probe_flips() {
        let probe = StaticProbe::new(true);
        assert!(probe.check().await);
        probe.set_online(false);
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn test_missing_location_is_unavailable() {
        let provider = FixedLocation::new(None);
        assert_eq!(provider.current().await, Err(CapabilityError::Unavailable));

        provider.set(FixedLocation::parse("40.7128, -74.0060"));
        let location = provider.current().await.unwrap();
        assert_eq!(location.lat, 40.7128);
        assert_eq!(location.accuracy, 0.0);
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(
            FixedLocation::parse("1.5,2.5,30").map(|l| l.accuracy),
            Some(30.0)
        );
        assert!(FixedLocation::parse("north").is_none());
        assert!(FixedLocation::parse("1,2,3,4").is_none());
    }
}
