use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    /// Accuracy radius in meters
    pub accuracy: f64,
}

impl Location {
    /// Text used to pre-fill the report location field.
    pub fn describe(&self) -> String {
        format!("Current Location ({:.6}, {:.6})", self.lat, self.lng)
    }
}
