use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
            Priority::Urgent => write!(f, "Urgent"),
        }
    }
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Lifecycle of a pickup. Moves forward only:
/// pending -> collected -> in-transit -> delivered, with cancelled
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum PickupStatus {
    #[default]
    Pending,
    Collected,
    InTransit,
    Delivered,
    Cancelled,
}

impl PickupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PickupStatus::Delivered | PickupStatus::Cancelled)
    }

    /// The next status along the delivery path, if any.
    pub fn next(&self) -> Option<PickupStatus> {
        match self {
            PickupStatus::Pending => Some(PickupStatus::Collected),
            PickupStatus::Collected => Some(PickupStatus::InTransit),
            PickupStatus::InTransit => Some(PickupStatus::Delivered),
            PickupStatus::Delivered | PickupStatus::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PickupStatus::Pending => "pending",
            PickupStatus::Collected => "collected",
            PickupStatus::InTransit => "in-transit",
            PickupStatus::Delivered => "delivered",
            PickupStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PickupStatus::Pending => write!(f, "Pending"),
            PickupStatus::Collected => write!(f, "Collected"),
            PickupStatus::InTransit => write!(f, "In Transit"),
            PickupStatus::Delivered => write!(f, "Delivered"),
            PickupStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct PickupRecord {
    pub id: String,
    #[serde(rename = "hospital")]
    pub facility: String,
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "time")]
    pub scheduled_time: String,
    #[serde(rename = "type")]
    pub sample_type: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: PickupStatus,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(rename = "estimatedDuration", default)]
    pub estimated_duration: u32,
    #[serde(rename = "collectedAt", default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(rename = "inTransitAt", default)]
    pub in_transit_at: Option<DateTime<Utc>>,
    #[serde(rename = "deliveredAt", default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(rename = "cancelledAt", default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl PickupRecord {
    /// Key into the configured temperature ranges ("Blood Sample" -> "blood").
    pub fn sample_kind(&self) -> String {
        self.sample_type
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn contact_display(&self) -> &str {
        self.contact.as_deref().unwrap_or("N/A")
    }

    /// Destination link for turn-by-turn navigation.
    pub fn navigation_url(&self) -> String {
        match self.coordinates {
            Some(c) => format!(
                "https://www.google.com/maps/dir/?api=1&destination={},{}",
                c.lat, c.lng
            ),
            None => format!(
                "https://www.google.com/maps/search/?api=1&query={}",
                self.address.replace(' ', "+")
            ),
        }
    }

    /// `tel:` link for the facility contact, digits and a leading `+` only.
    pub fn call_url(&self) -> Option<String> {
        let phone = self.phone.as_deref()?.trim();
        let dialable: String = phone
            .chars()
            .enumerate()
            .filter(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '+'))
            .map(|(_, c)| c)
            .collect();
        if dialable.is_empty() {
            None
        } else {
            Some(format!("tel:{}", dialable))
        }
    }
}
