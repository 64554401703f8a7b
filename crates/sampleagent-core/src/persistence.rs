//! Mirrors slices of `ApplicationState` to the key-value store.
//!
//! Each slice is read and written on its own. A slice that cannot be decoded
//! is replaced by its seed value and a slice that cannot be written is logged;
//! neither stops the remaining slices. The tips cache is not handled here,
//! `FreshnessLoader` owns it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use crate::config::StorageKeys;
use crate::models::{ChatTurn, IncidentReport, Preferences, ReportDraft};
use crate::seed;
use crate::state::{ApplicationState, Slices};
use crate::storage::{KvStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slice {
    Pickups,
    Preferences,
    ChatHistory,
    OfflineQueue,
    ReportDrafts,
}

impl Slice {
    pub const ALL: [Slice; 5] = [
        Slice::Pickups,
        Slice::Preferences,
        Slice::ChatHistory,
        Slice::OfflineQueue,
        Slice::ReportDrafts,
    ];

    /// Slices written after every mutation that touches them. Preferences
    /// are only written at teardown.
    pub const EAGER: [Slice; 4] = [
        Slice::Pickups,
        Slice::ChatHistory,
        Slice::OfflineQueue,
        Slice::ReportDrafts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Slice::Pickups => "pickups",
            Slice::Preferences => "preferences",
            Slice::ChatHistory => "chat_history",
            Slice::OfflineQueue => "offline_queue",
            Slice::ReportDrafts => "report_drafts",
        }
    }
}

/// How a slice was obtained during hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOrigin {
    Persisted,
    /// Nothing stored under the key.
    Seeded,
    /// Stored value was unreadable and was replaced by seed data.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct Hydrated {
    pub slices: Slices,
    pub origins: Vec<(Slice, SliceOrigin)>,
}

impl Hydrated {
    pub fn origin(&self, slice: Slice) -> Option<SliceOrigin> {
        self.origins
            .iter()
            .find(|(s, _)| *s == slice)
            .map(|(_, origin)| *origin)
    }
}

#[derive(Debug, Default)]
pub struct FlushReport {
    pub written: Vec<Slice>,
    pub failed: Vec<(Slice, String)>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KvStore>,
    keys: StorageKeys,
}

impl Persistence {
    pub fn new(store: Arc<dyn KvStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn key(&self, slice: Slice) -> &str {
        match slice {
            Slice::Pickups => &self.keys.pickups,
            Slice::Preferences => &self.keys.preferences,
            Slice::ChatHistory => &self.keys.chat_history,
            Slice::OfflineQueue => &self.keys.offline_queue,
            Slice::ReportDrafts => &self.keys.report_drafts,
        }
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Read every slice, substituting seed data where needed.
    pub fn hydrate(&self, now: DateTime<Utc>) -> Hydrated {
        let mut origins = Vec::with_capacity(Slice::ALL.len());

        let (pickups, origin) = self.read_slice(Slice::Pickups, || seed::pickups(now));
        origins.push((Slice::Pickups, origin));

        let (preferences, origin) =
            self.read_slice::<Preferences>(Slice::Preferences, Preferences::default);
        origins.push((Slice::Preferences, origin));

        let (chat, origin) = self.read_slice::<Vec<ChatTurn>>(Slice::ChatHistory, Vec::new);
        origins.push((Slice::ChatHistory, origin));

        let (offline_queue, origin) =
            self.read_slice::<Vec<IncidentReport>>(Slice::OfflineQueue, Vec::new);
        origins.push((Slice::OfflineQueue, origin));

        let (report_draft, origin) =
            self.read_slice::<ReportDraft>(Slice::ReportDrafts, ReportDraft::default);
        origins.push((Slice::ReportDrafts, origin));

        Hydrated {
            slices: Slices {
                pickups,
                chat,
                preferences,
                offline_queue,
                report_draft,
            },
            origins,
        }
    }

    fn read_slice<T: DeserializeOwned>(
        &self,
        slice: Slice,
        seed: impl FnOnce() -> T,
    ) -> (T, SliceOrigin) {
        let key = self.key(slice);
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(slice = slice.name(), "No persisted copy, using seed data");
                return (seed(), SliceOrigin::Seeded);
            }
            Err(e) => {
                warn!(slice = slice.name(), error = %e, "Failed to read slice, using seed data");
                return (seed(), SliceOrigin::Recovered);
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => (value, SliceOrigin::Persisted),
            Err(e) => {
                warn!(slice = slice.name(), error = %e, "Failed to decode slice, using seed data");
                (seed(), SliceOrigin::Recovered)
            }
        }
    }

    // =========================================================================
    // Flushing
    // =========================================================================

    /// Write one slice of `state`.
    pub fn flush_slice(&self, state: &ApplicationState, slice: Slice) -> Result<(), StorageError> {
        let key = self.key(slice);
        if slice == Slice::ReportDrafts && state.report_draft().is_empty() {
            return self.store.remove(key);
        }

        let json = match slice {
            Slice::Pickups => encode(state.pickups()),
            Slice::Preferences => encode(state.preferences()),
            Slice::ChatHistory => encode(state.chat()),
            Slice::OfflineQueue => encode(state.offline_queue()),
            Slice::ReportDrafts => encode(state.report_draft()),
        }?;
        self.store.set(key, &json)
    }

    /// Write each of `slices`, continuing past failures.
    pub fn flush(&self, state: &ApplicationState, slices: &[Slice]) -> FlushReport {
        let mut report = FlushReport::default();
        for &slice in slices {
            match self.flush_slice(state, slice) {
                Ok(()) => report.written.push(slice),
                Err(e) => {
                    error!(slice = slice.name(), error = %e, "Failed to persist slice");
                    report.failed.push((slice, e.to_string()));
                }
            }
        }
        report
    }

    /// Teardown flush of every slice.
    pub fn flush_all(&self, state: &ApplicationState) -> FlushReport {
        self.flush(state, &Slice::ALL)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueKind, Location, PickupRecord, Priority, Theme};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Persistence) {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::new(store.clone(), StorageKeys::default());
        (store, persistence)
    }

    fn populated_state() -> ApplicationState {
        let mut state = ApplicationState::new(
            Slices {
                pickups: seed::pickups(now()),
                ..Default::default()
            },
            "SM001",
        );
        state.collect("SM001", now()).unwrap();
        state.advance("SM003", now()).unwrap();
        state.cancel("SM004", now()).unwrap();
        state.append_turn(ChatTurn::answered(now(), "q".into(), "a".into()), 50);
        state.append_turn(ChatTurn::fallback(now(), "q2".into(), "sorry".into()), 50);
        state.set_preferences(Preferences {
            theme: Theme::Dark,
            notifications: false,
            voice_enabled: true,
        });
        state.update_draft(ReportDraft {
            kind: Some(IssueKind::Temperature),
            priority: Priority::High,
            location: Location {
                lat: 40.7128,
                lng: -74.006,
                accuracy: 12.0,
            }
            .describe(),
            description: "Cooler reading 11°C".to_string(),
        });
        let report = state.report_draft().finalize(now()).unwrap();
        state.queue_report(report);
        state
    }

    #[test]
    fn test_empty_store_hydrates_seed_data() {
        let (_, persistence) = setup();
        let hydrated = persistence.hydrate(now());

        assert_eq!(hydrated.slices.pickups.len(), 5);
        assert!(hydrated.slices.chat.is_empty());
        assert_eq!(hydrated.origin(Slice::Pickups), Some(SliceOrigin::Seeded));
    }

    #[test]
    fn test_flush_then_hydrate_preserves_every_field() {
        let (_, persistence) = setup();
        let state = populated_state();

        let report = persistence.flush_all(&state);
        assert!(report.is_complete());

        let hydrated = persistence.hydrate(now());
        assert_eq!(hydrated.slices.pickups, state.pickups());
        assert_eq!(hydrated.slices.chat, state.chat());
        assert_eq!(&hydrated.slices.preferences, state.preferences());
        assert_eq!(hydrated.slices.offline_queue, state.offline_queue());
        assert_eq!(&hydrated.slices.report_draft, state.report_draft());
        assert!(hydrated
            .origins
            .iter()
            .all(|(_, origin)| *origin == SliceOrigin::Persisted));
    }

    #[test]
    fn test_corrupt_slice_does_not_block_others() {
        let (store, persistence) = setup();
        let state = populated_state();
        persistence.flush_all(&state);

        store.set("sampleagent_pickups", "{not json").unwrap();

        let hydrated = persistence.hydrate(now());
        assert_eq!(hydrated.origin(Slice::Pickups), Some(SliceOrigin::Recovered));
        // Seeded pickups: SM001 is pending again
        assert_eq!(hydrated.slices.pickups, seed::pickups(now()));
        // Chat survived
        assert_eq!(hydrated.slices.chat.len(), 2);
        assert_eq!(hydrated.origin(Slice::ChatHistory), Some(SliceOrigin::Persisted));
    }

    #[test]
    fn test_write_failure_does_not_block_others() {
        let (store, persistence) = setup();
        let state = populated_state();
        store.deny_writes("sampleagent_pickups");

        let report = persistence.flush(&state, &Slice::EAGER);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Slice::Pickups);
        assert!(report.written.contains(&Slice::ChatHistory));
        assert!(store.contains("sampleagent_chat_history"));
        assert!(!store.contains("sampleagent_pickups"));
    }

    #[test]
    fn test_quota_exceeded_is_reported() {
        let store = Arc::new(MemoryStore::with_capacity(64));
        let persistence = Persistence::new(store.clone(), StorageKeys::default());
        let state = populated_state();

        let report = persistence.flush(&state, &[Slice::Pickups]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_empty_draft_removes_key() {
        let (store, persistence) = setup();
        let mut state = populated_state();
        persistence.flush_slice(&state, Slice::ReportDrafts).unwrap();
        assert!(store.contains("sampleagent_report_drafts"));

        state.clear_draft();
        persistence.flush_slice(&state, Slice::ReportDrafts).unwrap();
        assert!(!store.contains("sampleagent_report_drafts"));
    }

    #[test]
    fn test_pickups_decode_browser_field_names() {
        let raw = r#"[{"id":"SM009","hospital":"Lakeside Clinic","address":"1 Shore Rd",
            "time":"08:00 AM","type":"Blood Sample","priority":"urgent","status":"in-transit",
            "requirements":["Cold chain"],"estimatedDuration":10}]"#;
        let pickups: Vec<PickupRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(pickups[0].facility, "Lakeside Clinic");
        assert_eq!(pickups[0].status, crate::models::PickupStatus::InTransit);
        assert_eq!(pickups[0].priority, Priority::Urgent);
    }
}
