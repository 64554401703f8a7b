use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "ts")]
use ts_rs::TS;

/// Whether the reply in a turn came from the assistant or is the fixed
/// fallback shown after a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ReplyOutcome {
    #[default]
    Answered,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ChatTurn {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    #[serde(rename = "ai")]
    pub reply: String,
    #[serde(default)]
    pub outcome: ReplyOutcome,
}

impl ChatTurn {
    pub fn answered(timestamp: DateTime<Utc>, user: String, reply: String) -> Self {
        Self {
            timestamp,
            user,
            reply,
            outcome: ReplyOutcome::Answered,
        }
    }

    pub fn fallback(timestamp: DateTime<Utc>, user: String, reply: String) -> Self {
        Self {
            timestamp,
            user,
            reply,
            outcome: ReplyOutcome::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.outcome == ReplyOutcome::Fallback
    }
}

/// A user utterance waiting on the assistant. Shown as "Thinking..." and
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTurn {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub user: String,
}
