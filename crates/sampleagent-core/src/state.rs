//! The authoritative in-memory application state.
//!
//! `ApplicationState` is created once by the composition root and only
//! changes through the operations below, so that the caller can persist and
//! refresh the view after each one. Operations that would break the pickup
//! lifecycle are rejected with a `TransitionError` and leave the state as it
//! was, which also makes repeated events (a double-clicked collect) harmless.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::CacheEntry;
use crate::models::{
    filter_tips, ChatTurn, IncidentReport, Location, PendingTurn, PickupRecord, PickupStatus,
    Preferences, ReportDraft, TipCategory, TipEntry,
};
use crate::sensors::SensorReading;

// ============================================================================
// Sections
// ============================================================================

/// Named views of the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Dashboard,
    Tracking,
    Chat,
    Tips,
    Report,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Dashboard,
        Section::Tracking,
        Section::Chat,
        Section::Tips,
        Section::Report,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Section::Dashboard => "Dashboard",
            Section::Tracking => "Tracking",
            Section::Chat => "Assistant",
            Section::Tips => "Health Tips",
            Section::Report => "Report Issue",
        }
    }

    /// Numbered shortcut, 1-based.
    pub fn from_shortcut(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dashboard" => Some(Section::Dashboard),
            "tracking" => Some(Section::Tracking),
            "chat" | "assistant" => Some(Section::Chat),
            "tips" => Some(Section::Tips),
            "report" => Some(Section::Report),
            other => other.parse::<u8>().ok().and_then(Self::from_shortcut),
        }
    }
}

// ============================================================================
// Tracking
// ============================================================================

/// Coarse three-phase projection of the active pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TrackingStep {
    #[default]
    Pending = 1,
    Collected = 2,
    InTransit = 3,
}

impl TrackingStep {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn from_status(status: PickupStatus) -> Self {
        match status {
            PickupStatus::Pending | PickupStatus::Cancelled => TrackingStep::Pending,
            PickupStatus::Collected => TrackingStep::Collected,
            PickupStatus::InTransit | PickupStatus::Delivered => TrackingStep::InTransit,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackingStep::Pending => "Pending",
            TrackingStep::Collected => "Collected",
            TrackingStep::InTransit => "In Transit",
        }
    }

    /// Share of the timeline completed, 0-100.
    pub fn progress_percent(&self) -> u8 {
        (self.number() - 1) * 50
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tracking {
    pub step: TrackingStep,
    pub collected_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
}

impl Tracking {
    /// The projection of a record's current status.
    pub fn of(record: &PickupRecord) -> Self {
        Self {
            step: TrackingStep::from_status(record.status),
            collected_at: record.collected_at,
            in_transit_at: record.in_transit_at,
        }
    }
}

// ============================================================================
// Tips view
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TipsView {
    #[default]
    Idle,
    Loading,
    Ready,
    /// Loading failed; the error panel with a retry is shown.
    Unavailable(String),
}

// ============================================================================
// Transitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Collect,
    Advance,
    Cancel,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Collect => write!(f, "collect"),
            Transition::Advance => write!(f, "advance"),
            Transition::Cancel => write!(f, "cancel"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot {attempted} sample {id} while it is {from}")]
    InvalidTransition {
        id: String,
        from: PickupStatus,
        attempted: Transition,
    },

    #[error("Unknown sample: {0}")]
    UnknownPickup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PickupCounts {
    pub pending: usize,
    pub collected: usize,
    pub total: usize,
}

impl PickupCounts {
    pub fn tally(pickups: &[PickupRecord]) -> Self {
        Self {
            pending: pickups
                .iter()
                .filter(|p| p.status == PickupStatus::Pending)
                .count(),
            collected: pickups
                .iter()
                .filter(|p| p.status == PickupStatus::Collected)
                .count(),
            total: pickups.len(),
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Persisted slices a state is hydrated from.
#[derive(Debug, Clone, Default)]
pub struct Slices {
    pub pickups: Vec<PickupRecord>,
    pub chat: Vec<ChatTurn>,
    pub preferences: Preferences,
    pub offline_queue: Vec<IncidentReport>,
    pub report_draft: ReportDraft,
}

#[derive(Debug, Clone)]
pub struct ApplicationState {
    section: Section,
    pickups: Vec<PickupRecord>,
    counts: PickupCounts,
    chat: Vec<ChatTurn>,
    pending_turns: Vec<PendingTurn>,
    next_turn_id: u64,
    tips: Option<CacheEntry<Vec<TipEntry>>>,
    tips_view: TipsView,
    tips_filter: Option<TipCategory>,
    tracking: Tracking,
    active_pickup_id: String,
    online: bool,
    location: Option<Location>,
    sensor: Option<SensorReading>,
    preferences: Preferences,
    report_draft: ReportDraft,
    offline_queue: Vec<IncidentReport>,
}

impl ApplicationState {
    pub fn new(slices: Slices, active_pickup_id: impl Into<String>) -> Self {
        let active_pickup_id = active_pickup_id.into();
        let tracking = slices
            .pickups
            .iter()
            .find(|p| p.id == active_pickup_id)
            .map(Tracking::of)
            .unwrap_or_default();

        Self {
            section: Section::default(),
            counts: PickupCounts::tally(&slices.pickups),
            pickups: slices.pickups,
            chat: slices.chat,
            pending_turns: Vec::new(),
            next_turn_id: 1,
            tips: None,
            tips_view: TipsView::default(),
            tips_filter: None,
            tracking,
            active_pickup_id,
            online: true,
            location: None,
            sensor: None,
            preferences: slices.preferences,
            report_draft: slices.report_draft,
            offline_queue: slices.offline_queue,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn pickups(&self) -> &[PickupRecord] {
        &self.pickups
    }

    pub fn pickup(&self, id: &str) -> Option<&PickupRecord> {
        self.pickups.iter().find(|p| p.id == id)
    }

    pub fn counts(&self) -> PickupCounts {
        self.counts
    }

    pub fn chat(&self) -> &[ChatTurn] {
        &self.chat
    }

    pub fn pending_turns(&self) -> &[PendingTurn] {
        &self.pending_turns
    }

    pub fn tips_entry(&self) -> Option<&CacheEntry<Vec<TipEntry>>> {
        self.tips.as_ref()
    }

    pub fn tips(&self) -> &[TipEntry] {
        self.tips.as_ref().map(|e| e.payload.as_slice()).unwrap_or(&[])
    }

    /// Tips after the category filter
    pub fn visible_tips(&self) -> Vec<&TipEntry> {
        filter_tips(self.tips(), self.tips_filter)
    }

    pub fn tips_view(&self) -> &TipsView {
        &self.tips_view
    }

    pub fn tips_filter(&self) -> Option<TipCategory> {
        self.tips_filter
    }

    pub fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    pub fn active_pickup_id(&self) -> &str {
        &self.active_pickup_id
    }

    pub fn active_pickup(&self) -> Option<&PickupRecord> {
        self.pickup(&self.active_pickup_id)
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn sensor(&self) -> Option<SensorReading> {
        self.sensor
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn report_draft(&self) -> &ReportDraft {
        &self.report_draft
    }

    pub fn offline_queue(&self) -> &[IncidentReport] {
        &self.offline_queue
    }

    // =========================================================================
    // Navigation and environment
    // =========================================================================

    pub fn set_section(&mut self, section: Section) {
        self.section = section;
    }

    /// Returns true if connectivity actually changed.
    pub fn set_online(&mut self, online: bool) -> bool {
        let changed = self.online != online;
        self.online = online;
        changed
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = Some(location);
    }

    pub fn record_sensor(&mut self, reading: SensorReading) {
        self.sensor = Some(reading);
    }

    pub fn set_preferences(&mut self, preferences: Preferences) {
        self.preferences = preferences;
    }

    // =========================================================================
    // Pickup lifecycle
    // =========================================================================

    fn apply(
        &mut self,
        id: &str,
        attempted: Transition,
        now: DateTime<Utc>,
    ) -> Result<&PickupRecord, TransitionError> {
        let index = self
            .pickups
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| TransitionError::UnknownPickup(id.to_string()))?;

        let record = &mut self.pickups[index];
        let from = record.status;
        let to = match (attempted, from) {
            (Transition::Collect, PickupStatus::Pending)
            | (Transition::Advance, PickupStatus::Collected | PickupStatus::InTransit) => from.next(),
            (Transition::Cancel, s) if !s.is_terminal() => Some(PickupStatus::Cancelled),
            _ => None,
        };
        let Some(to) = to else {
            return Err(TransitionError::InvalidTransition {
                id: id.to_string(),
                from,
                attempted,
            });
        };

        record.status = to;
        match to {
            PickupStatus::Collected => record.collected_at = Some(now),
            PickupStatus::InTransit => record.in_transit_at = Some(now),
            PickupStatus::Delivered => record.delivered_at = Some(now),
            PickupStatus::Cancelled => record.cancelled_at = Some(now),
            PickupStatus::Pending => {}
        }

        self.counts = PickupCounts::tally(&self.pickups);
        Ok(&self.pickups[index])
    }

    /// pending -> collected; stamps the collection time once.
    pub fn collect(&mut self, id: &str, now: DateTime<Utc>) -> Result<&PickupRecord, TransitionError> {
        self.apply(id, Transition::Collect, now)
    }

    /// collected -> in-transit -> delivered
    pub fn advance(&mut self, id: &str, now: DateTime<Utc>) -> Result<&PickupRecord, TransitionError> {
        self.apply(id, Transition::Advance, now)
    }

    pub fn cancel(&mut self, id: &str, now: DateTime<Utc>) -> Result<&PickupRecord, TransitionError> {
        self.apply(id, Transition::Cancel, now)
    }

    // =========================================================================
    // Tracking timeline
    // =========================================================================

    pub fn mark_tracking_collected(&mut self, now: DateTime<Utc>) {
        self.tracking.step = TrackingStep::Collected;
        self.tracking.collected_at = Some(now);
        self.tracking.in_transit_at = None;
    }

    pub fn mark_tracking_in_transit(&mut self, now: DateTime<Utc>) {
        self.tracking.step = TrackingStep::InTransit;
        self.tracking.in_transit_at = Some(now);
    }

    pub fn reset_tracking(&mut self) {
        self.tracking = Tracking::default();
    }

    /// Re-derive the tracking projection from the active record.
    pub fn restore_tracking(&mut self) {
        self.tracking = self.active_pickup().map(Tracking::of).unwrap_or_default();
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Record the user's utterance while the reply is outstanding.
    pub fn begin_turn(&mut self, user: String, now: DateTime<Utc>) -> PendingTurn {
        let pending = PendingTurn {
            id: self.next_turn_id,
            timestamp: now,
            user,
        };
        self.next_turn_id += 1;
        self.pending_turns.push(pending.clone());
        pending
    }

    /// Close a pending turn with its reply and append it to the log.
    /// Unknown ids (already completed) are ignored.
    pub fn complete_turn(
        &mut self,
        id: u64,
        reply: Result<String, String>,
        limit: usize,
    ) -> Option<&ChatTurn> {
        let index = self.pending_turns.iter().position(|t| t.id == id)?;
        let pending = self.pending_turns.remove(index);
        let turn = match reply {
            Ok(text) => ChatTurn::answered(pending.timestamp, pending.user, text),
            Err(fallback) => ChatTurn::fallback(pending.timestamp, pending.user, fallback),
        };
        self.append_turn(turn, limit);
        self.chat.last()
    }

    /// Append and evict the oldest turns beyond `limit`.
    pub fn append_turn(&mut self, turn: ChatTurn, limit: usize) {
        self.chat.push(turn);
        if self.chat.len() > limit {
            let excess = self.chat.len() - limit;
            self.chat.drain(..excess);
        }
    }

    // =========================================================================
    // Tips
    // =========================================================================

    pub fn set_tips_loading(&mut self) {
        self.tips_view = TipsView::Loading;
    }

    /// Install a loaded tips entry, keeping at most `cap` tips.
    pub fn set_tips(&mut self, mut entry: CacheEntry<Vec<TipEntry>>, cap: usize) {
        entry.payload.truncate(cap);
        self.tips = Some(entry);
        self.tips_view = TipsView::Ready;
    }

    /// Loading failed. Tips already held stay in memory but are not shown.
    pub fn set_tips_unavailable(&mut self, reason: String) {
        self.tips_view = TipsView::Unavailable(reason);
    }

    pub fn set_tips_filter(&mut self, category: Option<TipCategory>) {
        self.tips_filter = category;
    }

    // =========================================================================
    // Reports
    // =========================================================================

    pub fn update_draft(&mut self, draft: ReportDraft) {
        self.report_draft = draft;
    }

    pub fn clear_draft(&mut self) {
        self.report_draft = ReportDraft::default();
    }

    pub fn queue_report(&mut self, report: IncidentReport) {
        self.offline_queue.push(report);
    }

    pub fn drain_offline_queue(&mut self) -> Vec<IncidentReport> {
        std::mem::take(&mut self.offline_queue)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap()
    }

    fn seeded() -> ApplicationState {
        ApplicationState::new(
            Slices {
                pickups: seed::pickups(now()),
                ..Default::default()
            },
            "SM001",
        )
    }

    fn turn(n: usize) -> ChatTurn {
        ChatTurn::answered(now(), format!("q{}", n), format!("a{}", n))
    }

    #[test]
    fn test_collect_pending_updates_counts() {
        let mut state = seeded();
        assert_eq!(
            state.counts(),
            PickupCounts {
                pending: 3,
                collected: 2,
                total: 5
            }
        );

        let record = state.collect("SM001", now()).unwrap();
        assert_eq!(record.status, PickupStatus::Collected);
        assert_eq!(record.collected_at, Some(now()));

        assert_eq!(
            state.counts(),
            PickupCounts {
                pending: 2,
                collected: 3,
                total: 5
            }
        );
    }

    #[test]
    fn test_collect_twice_is_rejected_without_effect() {
        let mut state = seeded();
        state.collect("SM001", now()).unwrap();
        let later = now() + Duration::minutes(3);

        let err = state.collect("SM001", later).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                id: "SM001".to_string(),
                from: PickupStatus::Collected,
                attempted: Transition::Collect,
            }
        );
        // Timestamp set exactly once
        assert_eq!(state.pickup("SM001").unwrap().collected_at, Some(now()));
        assert_eq!(state.counts().collected, 3);
    }

    #[test]
    fn test_collect_rejected_from_every_non_pending_status() {
        for status in [
            PickupStatus::Collected,
            PickupStatus::InTransit,
            PickupStatus::Delivered,
            PickupStatus::Cancelled,
        ] {
            let mut pickups = seed::pickups(now());
            pickups[0].status = status;
            let mut state = ApplicationState::new(
                Slices {
                    pickups,
                    ..Default::default()
                },
                "SM001",
            );
            assert!(state.collect("SM001", now()).is_err());
            assert_eq!(state.pickup("SM001").unwrap().status, status);
        }
    }

    #[test]
    fn test_full_delivery_path() {
        let mut state = seeded();
        state.collect("SM002", now()).unwrap();
        assert_eq!(
            state.advance("SM002", now()).unwrap().status,
            PickupStatus::InTransit
        );
        let delivered = state.advance("SM002", now()).unwrap();
        assert_eq!(delivered.status, PickupStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        // Terminal: nothing more is allowed
        assert!(state.advance("SM002", now()).is_err());
        assert!(state.cancel("SM002", now()).is_err());
    }

    #[test]
    fn test_advance_from_pending_is_invalid() {
        let mut state = seeded();
        assert!(matches!(
            state.advance("SM001", now()),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_from_non_terminal() {
        let mut state = seeded();
        let cancelled = state.cancel("SM003", now()).unwrap();
        assert_eq!(cancelled.status, PickupStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(state.counts().collected, 1);
        assert_eq!(state.counts().total, 5);
    }

    #[test]
    fn test_unknown_pickup() {
        let mut state = seeded();
        assert_eq!(
            state.collect("SM999", now()).unwrap_err(),
            TransitionError::UnknownPickup("SM999".to_string())
        );
    }

    #[test]
    fn test_chat_truncates_oldest_first() {
        let mut state = seeded();
        let limit = 10;
        for n in 0..limit + 5 {
            state.append_turn(turn(n), limit);
        }
        let users: Vec<&str> = state.chat().iter().map(|t| t.user.as_str()).collect();
        let expected: Vec<String> = (5..15).map(|n| format!("q{}", n)).collect();
        assert_eq!(users, expected);
    }

    #[test]
    fn test_pending_turn_completion() {
        let mut state = seeded();
        let first = state.begin_turn("how cold?".to_string(), now());
        let second = state.begin_turn("and urine?".to_string(), now());
        assert_eq!(state.pending_turns().len(), 2);

        let done = state
            .complete_turn(second.id, Err("Sorry".to_string()), 50)
            .unwrap();
        assert!(done.is_fallback());
        assert_eq!(done.user, "and urine?");

        state.complete_turn(first.id, Ok("2-8°C".to_string()), 50);
        assert!(state.pending_turns().is_empty());
        assert_eq!(state.chat().len(), 2);

        // A duplicate completion is ignored
        assert!(state.complete_turn(first.id, Ok("again".to_string()), 50).is_none());
        assert_eq!(state.chat().len(), 2);
    }

    #[test]
    fn test_tracking_initialised_from_active_pickup() {
        let state = ApplicationState::new(
            Slices {
                pickups: seed::pickups(now()),
                ..Default::default()
            },
            "SM003",
        );
        assert_eq!(state.tracking().step, TrackingStep::Collected);
        assert_eq!(seeded().tracking().step, TrackingStep::Pending);
    }

    #[test]
    fn test_restore_tracking_follows_record() {
        let mut state = seeded();
        state.collect("SM001", now()).unwrap();
        state.advance("SM001", now() + Duration::seconds(3)).unwrap();
        state.reset_tracking();
        assert_eq!(state.tracking().step, TrackingStep::Pending);

        state.restore_tracking();
        assert_eq!(state.tracking().step, TrackingStep::InTransit);
        assert_eq!(state.tracking().collected_at, Some(now()));
        assert_eq!(
            state.tracking().in_transit_at,
            Some(now() + Duration::seconds(3))
        );
    }

    #[test]
    fn test_tracking_progress() {
        assert_eq!(TrackingStep::Pending.progress_percent(), 0);
        assert_eq!(TrackingStep::Collected.progress_percent(), 50);
        assert_eq!(TrackingStep::InTransit.progress_percent(), 100);
    }

    #[test]
    fn test_section_shortcuts() {
        assert_eq!(Section::from_shortcut(1), Some(Section::Dashboard));
        assert_eq!(Section::from_shortcut(5), Some(Section::Report));
        assert_eq!(Section::from_shortcut(0), None);
        assert_eq!(Section::from_shortcut(6), None);
        assert_eq!(Section::parse("3"), Some(Section::Chat));
        assert_eq!(Section::parse("Tips"), Some(Section::Tips));
    }

    #[test]
    fn test_tips_filter_and_cap() {
        let mut state = seeded();
        let entry = CacheEntry::new(seed::tips(), now(), Duration::minutes(5));
        state.set_tips(entry, 6);
        assert_eq!(state.tips().len(), 6);
        assert_eq!(state.tips_view(), &TipsView::Ready);

        state.set_tips_filter(Some(TipCategory::Safety));
        assert!(state
            .visible_tips()
            .iter()
            .all(|t| t.category == TipCategory::Safety));

        state.set_tips_unavailable("offline".to_string());
        assert_eq!(state.tips().len(), 6);
    }

    #[test]
    fn test_connectivity_change_detection() {
        let mut state = seeded();
        assert!(!state.set_online(true));
        assert!(state.set_online(false));
        assert!(!state.is_online());
    }
}
