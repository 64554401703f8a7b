//! Composition of state, persistence and the external boundaries.
//!
//! `App` owns the single `ApplicationState` and applies every `Action` to it
//! on the caller's thread. Slow work (assistant replies, tips fetches,
//! connectivity probes, location lookups) runs on spawned tasks that hold only
//! cloned handles and report back as `AppEvent`s on one channel. The event
//! loop feeds those events to `handle_event`, so all mutations happen in the
//! order events are processed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assistant::{completion_request, Assistant, AssistantError};
use crate::cache::{FetchFailed, FreshnessLoader, LoadSource, Loaded};
use crate::clock::Clock;
use crate::config::{Config, Feature};
use crate::device::{CapabilityError, ConnectivityProbe, LocationProvider};
use crate::dispatch::{Action, DispatchOutcome, DraftField, NoticeLevel, ViewPart};
use crate::models::{Location, PickupStatus, Preferences, TipEntry};
use crate::persistence::{FlushReport, Persistence, Slice};
use crate::seed::CHAT_STARTERS;
use crate::sensors::SensorReading;
use crate::state::{ApplicationState, Section, TrackingStep, Transition, TransitionError};
use crate::storage::KvStore;
use crate::timer::{spawn_ticker, CancellableTimer};
use crate::tips::{TipsError, TipsSource};
use crate::utils::format_elapsed;

/// Buffer size for the event channel
const CHANNEL_BUFFER_SIZE: usize = 100;

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Clock,
    Elapsed,
    Connectivity,
    Sensors,
    Tips,
}

/// Results of background work and timer firings.
#[derive(Debug)]
pub enum AppEvent {
    AutoAdvanceFired {
        generation: u64,
    },
    AssistantReplied {
        turn_id: u64,
        result: Result<String, AssistantError>,
    },
    TipsLoaded(Result<Loaded<Vec<TipEntry>>, FetchFailed<Vec<TipEntry>, TipsError>>),
    LocationResolved(Result<Location, CapabilityError>),
    ConnectivityChecked(bool),
    Tick(TickKind),
}

#[derive(Debug, Clone, Copy)]
enum ContactLink {
    Navigate,
    Call,
}

/// External collaborators handed to `App::new`.
pub struct Services {
    pub store: Arc<dyn KvStore>,
    pub assistant: Arc<dyn Assistant>,
    pub tips: Arc<dyn TipsSource>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub locator: Arc<dyn LocationProvider>,
    pub clock: Arc<dyn Clock>,
}

// ============================================================================
// App
// ============================================================================

pub struct App {
    pub config: Config,
    state: ApplicationState,
    persistence: Persistence,
    tips_loader: FreshnessLoader,

    assistant: Arc<dyn Assistant>,
    tips_source: Arc<dyn TipsSource>,
    probe: Arc<dyn ConnectivityProbe>,
    locator: Arc<dyn LocationProvider>,
    clock: Arc<dyn Clock>,

    auto_advance: CancellableTimer,

    // At most one of each in flight
    tips_in_flight: bool,
    probe_in_flight: bool,
    location_in_flight: bool,

    events_tx: mpsc::Sender<AppEvent>,
    events_rx: mpsc::Receiver<AppEvent>,
}

impl App {
    /// Hydrate state from the store and wire up the services.
    pub fn new(config: Config, services: Services) -> Self {
        let now = services.clock.now();
        let persistence = Persistence::new(services.store.clone(), config.storage.clone());
        let hydrated = persistence.hydrate(now);
        for (slice, origin) in &hydrated.origins {
            debug!(slice = slice.name(), ?origin, "Slice hydrated");
        }

        let mut state =
            ApplicationState::new(hydrated.slices, config.tracking.active_pickup_id.clone());

        let tips_loader = FreshnessLoader::new(services.store.clone(), services.clock.clone());
        if let Some(entry) =
            tips_loader.peek::<Vec<TipEntry>>(&config.storage.health_tips, config.tips.validity())
        {
            if entry.is_fresh_at(now) {
                state.set_tips(entry, config.performance.tips_cache_size);
            }
        }

        let (events_tx, events_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        info!(
            pickups = state.pickups().len(),
            chat_turns = state.chat().len(),
            queued_reports = state.offline_queue().len(),
            "Field console ready"
        );

        Self {
            config,
            state,
            persistence,
            tips_loader,
            assistant: services.assistant,
            tips_source: services.tips,
            probe: services.probe,
            locator: services.locator,
            clock: services.clock,
            auto_advance: CancellableTimer::new(),
            tips_in_flight: false,
            probe_in_flight: false,
            location_in_flight: false,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &ApplicationState {
        &self.state
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_tips_loading(&self) -> bool {
        self.tips_in_flight
    }

    /// Time since the active pickup was collected, as m:ss.
    pub fn elapsed_since_collection(&self) -> Option<String> {
        let collected_at = self.state.tracking().collected_at?;
        Some(format_elapsed(self.now() - collected_at))
    }

    /// Whether the active pickup has been on the road longer than allowed.
    pub fn transport_overdue(&self) -> bool {
        let tracking = self.state.tracking();
        match (tracking.step, tracking.collected_at) {
            (TrackingStep::InTransit, Some(collected_at)) => {
                (self.now() - collected_at).num_minutes()
                    > self.config.collection.max_transport_minutes as i64
            }
            _ => false,
        }
    }

    /// Whether the last sensor reading suits the active pickup's sample.
    pub fn sensor_in_range(&self) -> Option<bool> {
        let reading = self.state.sensor()?;
        let kind = self.state.active_pickup()?.sample_kind();
        Some(reading.in_range(self.config.collection.range_for(&kind)))
    }

    // =========================================================================
    // Event plumbing
    // =========================================================================

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.events_rx.recv().await
    }

    /// Apply every event already waiting, without blocking.
    pub fn check_background_tasks(&mut self) -> DispatchOutcome {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }

        let mut outcome = DispatchOutcome::new();
        for event in events {
            outcome.merge(self.handle_event(event));
        }
        outcome
    }

    /// Start the periodic clock, connectivity, sensor and tips tickers.
    pub fn spawn_tickers(&self) -> Vec<JoinHandle<()>> {
        let timers = &self.config.timers;
        [
            (timers.clock_refresh_secs, TickKind::Clock),
            (timers.elapsed_refresh_secs, TickKind::Elapsed),
            (timers.connectivity_check_secs, TickKind::Connectivity),
            (timers.sensor_refresh_secs, TickKind::Sensors),
            (self.config.tips.refresh_interval_secs, TickKind::Tips),
        ]
        .into_iter()
        .filter(|(secs, _)| *secs > 0)
        .map(|(secs, kind)| {
            spawn_ticker(Duration::from_secs(secs), self.events_tx.clone(), move || {
                AppEvent::Tick(kind)
            })
        })
        .collect()
    }

    async fn send_event(tx: &mpsc::Sender<AppEvent>, event: AppEvent) {
        if let Err(e) = tx.send(event).await {
            warn!(error = %e, "Failed to deliver background result - channel closed");
        }
    }

    fn persist(&self, slices: &[Slice]) {
        let report = self.persistence.flush(&self.state, slices);
        if !report.is_complete() {
            debug!(failed = report.failed.len(), "Eager flush incomplete");
        }
    }

    /// Final flush of every slice, preferences included.
    pub fn teardown(&mut self) -> FlushReport {
        self.auto_advance.cancel();
        let report = self.persistence.flush_all(&self.state);
        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            "Session state flushed"
        );
        report
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub fn dispatch(&mut self, action: Action) -> DispatchOutcome {
        debug!(?action, "Dispatching");
        match action {
            Action::ShowSection(section) => self.show_section(section),
            Action::Shortcut(n) => match Section::from_shortcut(n) {
                Some(section) => self.show_section(section),
                None => DispatchOutcome::new(),
            },

            Action::Collect(id) => self.transition(&id, Transition::Collect),
            Action::Advance(id) => self.transition(&id, Transition::Advance),
            Action::Cancel(id) => self.transition(&id, Transition::Cancel),
            Action::Navigate(id) => self.contact_link(&id, ContactLink::Navigate),
            Action::Call(id) => self.contact_link(&id, ContactLink::Call),
            Action::ToggleTracking(collected) => self.toggle_tracking(collected),
            Action::RefreshSensors => self.refresh_sensors(),

            Action::SendMessage(text) => self.send_message(&text),
            Action::SendStarter(index) => match CHAT_STARTERS.get(index) {
                Some(starter) => self.send_message(starter),
                None => {
                    let mut outcome = DispatchOutcome::new();
                    outcome.notice(NoticeLevel::Error, "Unknown suggested question");
                    outcome
                }
            },

            Action::LoadTips { force } => self.load_tips(force),
            Action::FilterTips(category) => {
                self.state.set_tips_filter(category);
                let mut outcome = DispatchOutcome::new();
                outcome.refresh(ViewPart::Tips);
                outcome
            }

            Action::UpdateDraft(field) => self.update_draft(field),
            Action::UseCurrentLocation => self.request_location(),
            Action::SubmitReport => self.submit_report(),
            Action::ClearReport => {
                self.state.clear_draft();
                self.persist(&[Slice::ReportDrafts]);
                let mut outcome = DispatchOutcome::new();
                outcome
                    .notice(NoticeLevel::Info, "Report form cleared")
                    .refresh(ViewPart::Report);
                outcome
            }

            Action::SetTheme(theme) => {
                let mut preferences = self.state.preferences().clone();
                preferences.theme = theme;
                self.set_preferences(preferences)
            }
            Action::SetNotifications(enabled) => {
                let mut preferences = self.state.preferences().clone();
                preferences.notifications = enabled;
                self.set_preferences(preferences)
            }
            Action::SetVoice(enabled) => {
                if enabled && !self.config.features.is_enabled(Feature::VoiceInput) {
                    let mut outcome = DispatchOutcome::new();
                    outcome.notice(
                        NoticeLevel::Error,
                        CapabilityError::Disabled(Feature::VoiceInput).to_string(),
                    );
                    return outcome;
                }
                let mut preferences = self.state.preferences().clone();
                preferences.voice_enabled = enabled;
                self.set_preferences(preferences)
            }
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) -> DispatchOutcome {
        match event {
            AppEvent::AutoAdvanceFired { generation } => self.auto_advance_fired(generation),
            AppEvent::AssistantReplied { turn_id, result } => self.assistant_replied(turn_id, result),
            AppEvent::TipsLoaded(result) => self.tips_loaded(result),
            AppEvent::LocationResolved(result) => self.location_resolved(result),
            AppEvent::ConnectivityChecked(online) => self.connectivity_checked(online),
            AppEvent::Tick(kind) => self.tick(kind),
        }
    }

    // =========================================================================
    // Sections
    // =========================================================================

    fn show_section(&mut self, section: Section) -> DispatchOutcome {
        self.state.set_section(section);
        let mut outcome = DispatchOutcome::new();
        outcome.refresh(ViewPart::Section);

        match section {
            Section::Dashboard => {
                outcome
                    .notice(NoticeLevel::Info, "Pickup list refreshed")
                    .refresh(ViewPart::Pickups)
                    .refresh(ViewPart::Counts);
            }
            Section::Tracking => {
                outcome.refresh(ViewPart::Tracking);
                outcome.merge(self.refresh_sensors());
            }
            Section::Chat => {
                outcome.refresh(ViewPart::Chat);
            }
            Section::Tips => {
                outcome.merge(self.load_tips(false));
            }
            Section::Report => {
                outcome.refresh(ViewPart::Report);
                if !self.state.report_draft().is_empty() {
                    outcome.notice(NoticeLevel::Info, "Draft restored");
                }
            }
        }
        outcome
    }

    // =========================================================================
    // Pickups and tracking
    // =========================================================================

    fn transition(&mut self, id: &str, transition: Transition) -> DispatchOutcome {
        let now = self.now();
        let mut outcome = DispatchOutcome::new();

        let result = match transition {
            Transition::Collect => self.state.collect(id, now),
            Transition::Advance => self.state.advance(id, now),
            Transition::Cancel => self.state.cancel(id, now),
        }
        .map(|record| record.status);

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "Transition ignored");
                outcome.rejected = Some(e);
                return outcome;
            }
        };

        info!(pickup = id, status = %status, "Pickup status changed");
        self.persist(&[Slice::Pickups]);

        if id == self.state.active_pickup_id() {
            self.sync_tracking(status, now);
            outcome.refresh(ViewPart::Tracking);
        }

        let message = match status {
            PickupStatus::Collected => format!("Sample {} marked as collected", id),
            PickupStatus::InTransit => format!("Sample {} is in transit", id),
            PickupStatus::Delivered => format!("Sample {} delivered to lab", id),
            PickupStatus::Cancelled => format!("Pickup {} cancelled", id),
            PickupStatus::Pending => format!("Pickup {} updated", id),
        };
        outcome
            .notice(NoticeLevel::Success, message)
            .refresh(ViewPart::Pickups)
            .refresh(ViewPart::Counts);
        outcome
    }

    /// Keep the tracking projection in line with the active pickup after a
    /// transition made from the pickup list.
    fn sync_tracking(&mut self, status: PickupStatus, now: DateTime<Utc>) {
        match status {
            PickupStatus::Collected => {
                self.state.mark_tracking_collected(now);
                self.schedule_auto_advance();
            }
            PickupStatus::InTransit => {
                self.auto_advance.cancel();
                self.state.mark_tracking_in_transit(now);
            }
            PickupStatus::Cancelled => {
                self.auto_advance.cancel();
                self.state.reset_tracking();
            }
            PickupStatus::Pending | PickupStatus::Delivered => {}
        }
    }

    fn contact_link(&self, id: &str, link: ContactLink) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new();
        let Some(pickup) = self.state.pickup(id) else {
            outcome.rejected = Some(TransitionError::UnknownPickup(id.to_string()));
            return outcome;
        };

        match link {
            ContactLink::Navigate => {
                info!(pickup = id, "Navigation started");
                outcome.notice(
                    NoticeLevel::Info,
                    format!(
                        "Navigation started to {}: {}",
                        pickup.address,
                        pickup.navigation_url()
                    ),
                );
            }
            ContactLink::Call => match pickup.call_url() {
                Some(url) => {
                    outcome.notice(
                        NoticeLevel::Info,
                        format!("Calling {}: {}", pickup.contact_display(), url),
                    );
                }
                None => {
                    outcome.notice(
                        NoticeLevel::Error,
                        format!("No phone number for {}", pickup.facility),
                    );
                }
            },
        }
        outcome
    }

    fn toggle_tracking(&mut self, collected: bool) -> DispatchOutcome {
        let now = self.now();
        let mut outcome = DispatchOutcome::new();
        outcome.refresh(ViewPart::Tracking);

        if !collected {
            self.auto_advance.cancel();
            self.state.reset_tracking();
            outcome.notice(NoticeLevel::Info, "Collection status reset");
            return outcome;
        }

        let id = self.state.active_pickup_id().to_string();
        match self.state.active_pickup().map(|p| p.status) {
            Some(PickupStatus::Pending) => {
                if let Err(e) = self.state.collect(&id, now) {
                    debug!(error = %e, "Tracking collect ignored");
                    outcome.rejected = Some(e);
                    return outcome;
                }
                self.persist(&[Slice::Pickups]);
                outcome.refresh(ViewPart::Pickups).refresh(ViewPart::Counts);
            }
            // Re-toggled after backing out; the record already moved on
            Some(PickupStatus::Collected) => {}
            // Already past collection; show where the record actually is
            Some(PickupStatus::InTransit | PickupStatus::Delivered) => {
                self.auto_advance.cancel();
                self.state.restore_tracking();
                return outcome;
            }
            Some(status) => {
                outcome.rejected = Some(TransitionError::InvalidTransition {
                    id,
                    from: status,
                    attempted: Transition::Collect,
                });
                return outcome;
            }
            None => {
                outcome.rejected = Some(TransitionError::UnknownPickup(id));
                return outcome;
            }
        }

        self.state.mark_tracking_collected(now);
        self.schedule_auto_advance();
        outcome.notice(NoticeLevel::Success, "Sample collected successfully!");
        outcome
    }

    /// (Re)start the move to in transit for the active pickup.
    fn schedule_auto_advance(&mut self) {
        self.auto_advance.schedule(
            self.config.tracking.auto_advance_delay(),
            self.events_tx.clone(),
            |generation| AppEvent::AutoAdvanceFired { generation },
        );
    }

    fn auto_advance_fired(&mut self, generation: u64) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new();
        if !self.auto_advance.accept(generation) {
            return outcome;
        }
        if self.state.tracking().step != TrackingStep::Collected {
            debug!(generation, "Auto-advance fired outside the collected step");
            return outcome;
        }

        let now = self.now();
        let id = self.state.active_pickup_id().to_string();
        if self.state.active_pickup().map(|p| p.status) == Some(PickupStatus::Collected) {
            match self.state.advance(&id, now) {
                Ok(_) => {
                    self.persist(&[Slice::Pickups]);
                    outcome.refresh(ViewPart::Pickups).refresh(ViewPart::Counts);
                }
                Err(e) => debug!(error = %e, "Auto-advance transition ignored"),
            }
        }

        self.state.mark_tracking_in_transit(now);
        info!(pickup = %id, "Sample in transit");
        outcome
            .notice(NoticeLevel::Info, "Sample is now in transit to the lab")
            .refresh(ViewPart::Tracking);
        outcome
    }

    fn refresh_sensors(&mut self) -> DispatchOutcome {
        let reading = SensorReading::simulate(&mut rand::thread_rng(), self.now());
        self.state.record_sensor(reading);

        let mut outcome = DispatchOutcome::new();
        outcome.refresh(ViewPart::Sensors);
        if self.sensor_in_range() == Some(false) {
            outcome.notice(
                NoticeLevel::Warning,
                format!(
                    "Temperature {} is outside the safe range for this sample",
                    reading.temperature_display()
                ),
            );
        }
        outcome
    }

    // =========================================================================
    // Chat
    // =========================================================================

    fn send_message(&mut self, text: &str) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new();
        let text = text.trim();
        if text.is_empty() {
            return outcome;
        }

        let pending = self.state.begin_turn(text.to_string(), self.now());
        let request = completion_request(&self.config.assistant, &pending.user);
        let assistant = self.assistant.clone();
        let tx = self.events_tx.clone();
        let turn_id = pending.id;

        tokio::spawn(async move {
            let result = assistant.complete(request).await;
            Self::send_event(&tx, AppEvent::AssistantReplied { turn_id, result }).await;
        });

        outcome.refresh(ViewPart::Chat);
        outcome
    }

    fn assistant_replied(
        &mut self,
        turn_id: u64,
        result: Result<String, AssistantError>,
    ) -> DispatchOutcome {
        let reply = result.map_err(|e| {
            warn!(turn = turn_id, error = %e, "Assistant request failed");
            self.config.assistant.fallback_reply.clone()
        });

        let mut outcome = DispatchOutcome::new();
        let limit = self.config.performance.chat_history_limit;
        if self.state.complete_turn(turn_id, reply, limit).is_some() {
            self.persist(&[Slice::ChatHistory]);
            outcome.refresh(ViewPart::Chat);
        }
        outcome
    }

    // =========================================================================
    // Tips
    // =========================================================================

    fn load_tips(&mut self, force: bool) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new();
        if self.tips_in_flight {
            debug!("Tips load already in flight");
            return outcome;
        }

        let key = self.config.storage.health_tips.clone();
        let validity = self.config.tips.validity();

        if !force {
            if let Some(entry) = self.tips_loader.peek::<Vec<TipEntry>>(&key, validity) {
                if entry.is_fresh_at(self.now()) {
                    // Cached and fresh; nothing to fetch
                    if self.state.tips_entry() != Some(&entry) {
                        self.state
                            .set_tips(entry, self.config.performance.tips_cache_size);
                    }
                    outcome.refresh(ViewPart::Tips);
                    return outcome;
                }
            }
        }

        self.tips_in_flight = true;
        self.state.set_tips_loading();

        let loader = self.tips_loader.clone();
        let source = self.tips_source.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = if force {
                loader.refresh(&key, validity, || source.fetch()).await
            } else {
                loader.load(&key, validity, || source.fetch()).await
            };
            Self::send_event(&tx, AppEvent::TipsLoaded(result)).await;
        });

        outcome.refresh(ViewPart::Tips);
        outcome
    }

    fn tips_loaded(
        &mut self,
        result: Result<Loaded<Vec<TipEntry>>, FetchFailed<Vec<TipEntry>, TipsError>>,
    ) -> DispatchOutcome {
        self.tips_in_flight = false;
        let mut outcome = DispatchOutcome::new();
        outcome.refresh(ViewPart::Tips);

        match result {
            Ok(loaded) => {
                debug!(
                    count = loaded.entry.payload.len(),
                    cached = loaded.source == LoadSource::Cache,
                    "Tips loaded"
                );
                self.state
                    .set_tips(loaded.entry, self.config.performance.tips_cache_size);
            }
            Err(failed) => {
                warn!(
                    error = %failed.error,
                    has_stale = failed.stale.is_some(),
                    "Failed to load health tips"
                );
                self.state.set_tips_unavailable(failed.error.to_string());
                outcome.notice(NoticeLevel::Error, "Failed to load health tips");
            }
        }
        outcome
    }

    // =========================================================================
    // Reports
    // =========================================================================

    fn update_draft(&mut self, field: DraftField) -> DispatchOutcome {
        let mut draft = self.state.report_draft().clone();
        match field {
            DraftField::Kind(kind) => draft.kind = Some(kind),
            DraftField::Priority(priority) => draft.priority = priority,
            DraftField::Location(location) => draft.location = location,
            DraftField::Description(description) => draft.description = description,
        }
        self.state.update_draft(draft);
        self.persist(&[Slice::ReportDrafts]);

        let mut outcome = DispatchOutcome::new();
        outcome.refresh(ViewPart::Report);
        outcome
    }

    fn request_location(&mut self) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new();
        if !self.config.features.is_enabled(Feature::GpsTracking) {
            outcome.notice(
                NoticeLevel::Error,
                CapabilityError::Disabled(Feature::GpsTracking).to_string(),
            );
            return outcome;
        }
        if self.location_in_flight {
            return outcome;
        }

        self.location_in_flight = true;
        let locator = self.locator.clone();
        let timeout = Duration::from_millis(self.config.geo.timeout_ms);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, locator.current()).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::TimedOut("location")),
            };
            Self::send_event(&tx, AppEvent::LocationResolved(result)).await;
        });

        outcome.notice(NoticeLevel::Info, "Getting your location...");
        outcome
    }

    fn location_resolved(&mut self, result: Result<Location, CapabilityError>) -> DispatchOutcome {
        self.location_in_flight = false;
        let mut outcome = DispatchOutcome::new();
        match result {
            Ok(location) => {
                self.state.set_location(location);
                outcome.merge(self.update_draft(DraftField::Location(location.describe())));
                outcome.notice(NoticeLevel::Success, "Location added to report");
            }
            Err(e) => {
                warn!(error = %e, "Location unavailable");
                outcome.notice(NoticeLevel::Error, e.to_string());
            }
        }
        outcome
    }

    fn submit_report(&mut self) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::new();
        let report = match self.state.report_draft().finalize(self.now()) {
            Ok(report) => report,
            Err(e) => {
                outcome.notice(NoticeLevel::Error, e.to_string());
                return outcome;
            }
        };

        if self.state.is_online() {
            info!(report = %report.id, kind = ?report.kind, priority = %report.priority, "Incident report submitted");
            outcome.notice(NoticeLevel::Success, "Issue report submitted successfully");
        } else if self.config.features.is_enabled(Feature::OfflineMode) {
            info!(report = %report.id, "Incident report queued offline");
            self.state.queue_report(report);
            self.persist(&[Slice::OfflineQueue]);
            outcome.notice(
                NoticeLevel::Info,
                "Report saved offline. It will be sent when connection is restored.",
            );
        } else {
            outcome.notice(NoticeLevel::Error, "Cannot submit reports while offline");
            return outcome;
        }

        self.state.clear_draft();
        self.persist(&[Slice::ReportDrafts]);
        outcome.refresh(ViewPart::Report);
        outcome
    }

    // =========================================================================
    // Connectivity, timers, preferences
    // =========================================================================

    fn connectivity_checked(&mut self, online: bool) -> DispatchOutcome {
        self.probe_in_flight = false;
        let mut outcome = DispatchOutcome::new();
        if !self.state.set_online(online) {
            return outcome;
        }

        outcome.refresh(ViewPart::Connectivity);
        if !online {
            warn!("Connection lost");
            outcome.notice(NoticeLevel::Warning, "Working offline");
            return outcome;
        }

        info!("Connection restored");
        outcome.notice(NoticeLevel::Success, "Connection restored");

        let queued = self.state.drain_offline_queue();
        if !queued.is_empty() {
            for report in &queued {
                info!(report = %report.id, "Queued incident report submitted");
            }
            self.persist(&[Slice::OfflineQueue]);
            outcome.notice(
                NoticeLevel::Info,
                format!("Sent {} queued report(s)", queued.len()),
            );
        }
        outcome
    }

    fn tick(&mut self, kind: TickKind) -> DispatchOutcome {
        match kind {
            TickKind::Clock => {
                let mut outcome = DispatchOutcome::new();
                outcome.refresh(ViewPart::Clock);
                outcome
            }
            TickKind::Elapsed => {
                let mut outcome = DispatchOutcome::new();
                if self.state.tracking().collected_at.is_some() {
                    outcome.refresh(ViewPart::Elapsed);
                }
                outcome
            }
            TickKind::Sensors => self.refresh_sensors(),
            TickKind::Tips => self.load_tips(false),
            TickKind::Connectivity => {
                if !self.probe_in_flight {
                    self.probe_in_flight = true;
                    let probe = self.probe.clone();
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let online = probe.check().await;
                        Self::send_event(&tx, AppEvent::ConnectivityChecked(online)).await;
                    });
                }
                DispatchOutcome::new()
            }
        }
    }

    fn set_preferences(&mut self, preferences: Preferences) -> DispatchOutcome {
        self.state.set_preferences(preferences);
        let mut outcome = DispatchOutcome::new();
        outcome.refresh(ViewPart::Preferences);
        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::TimeZone;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    use super::*;
    use crate::assistant::CompletionRequest;
    use crate::clock::ManualClock;
    use crate::device::{FixedLocation, StaticProbe};
    use crate::models::{ChatTurn, IssueKind, Priority, Theme};
    use crate::seed;
    use crate::state::PickupCounts;
    use crate::storage::MemoryStore;

    struct ScriptedAssistant {
        replies: Mutex<VecDeque<Result<String, AssistantError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedAssistant {
        fn new(replies: Vec<Result<String, AssistantError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Assistant for ScriptedAssistant {
        fn complete(
            &self,
            request: CompletionRequest,
        ) -> BoxFuture<'_, Result<String, AssistantError>> {
            self.prompts.lock().unwrap().push(request.prompt);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AssistantError::RateLimited));
            async move { reply }.boxed()
        }
    }

    #[derive(Default)]
    struct CountingTips {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl TipsSource for CountingTips {
        fn fetch(&self) -> BoxFuture<'_, Result<Vec<TipEntry>, TipsError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail.load(Ordering::SeqCst);
            async move {
                if fail {
                    Err(TipsError::Unavailable("offline".to_string()))
                } else {
                    Ok(seed::tips())
                }
            }
            .boxed()
        }
    }

    struct Harness {
        app: App,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        tips: Arc<CountingTips>,
        probe: Arc<StaticProbe>,
        assistant: Arc<ScriptedAssistant>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap()
    }

    fn harness_with(
        config: Config,
        store: Arc<MemoryStore>,
        replies: Vec<Result<String, AssistantError>>,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(t0()));
        let tips = Arc::new(CountingTips::default());
        let probe = Arc::new(StaticProbe::new(true));
        let assistant = Arc::new(ScriptedAssistant::new(replies));
        let app = App::new(
            config,
            Services {
                store: store.clone(),
                assistant: assistant.clone(),
                tips: tips.clone(),
                probe: probe.clone(),
                locator: Arc::new(FixedLocation::new(Some(Location {
                    lat: 40.7128,
                    lng: -74.006,
                    accuracy: 8.0,
                }))),
                clock: clock.clone(),
            },
        );
        Harness {
            app,
            store,
            clock,
            tips,
            probe,
            assistant,
        }
    }

    fn harness() -> Harness {
        harness_with(Config::default(), Arc::new(MemoryStore::new()), Vec::new())
    }

    /// Wait for the next event and apply it.
    async fn step(app: &mut App) -> DispatchOutcome {
        let event = app.next_event().await.unwrap();
        app.handle_event(event)
    }

    fn stored_chat(store: &MemoryStore) -> Vec<ChatTurn> {
        serde_json::from_str(&store.get("sampleagent_chat_history").unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_collect_active_pickup_scenario() {
        let mut h = harness();
        assert_eq!(
            h.app.state().counts(),
            PickupCounts {
                pending: 3,
                collected: 2,
                total: 5
            }
        );

        let outcome = h.app.dispatch(Action::Collect("SM001".to_string()));
        assert!(outcome.needs(ViewPart::Counts));
        assert_eq!(outcome.notices[0].level, NoticeLevel::Success);

        let counts = h.app.state().counts();
        assert_eq!((counts.pending, counts.collected, counts.total), (2, 3, 5));
        let sm001 = h.app.state().pickup("SM001").unwrap();
        assert_eq!(sm001.status, PickupStatus::Collected);
        assert_eq!(sm001.collected_at, Some(t0()));

        // Persisted eagerly
        let raw = h.store.get("sampleagent_pickups").unwrap().unwrap();
        assert!(raw.contains(r#""status":"collected""#));

        // Double click
        let again = h.app.dispatch(Action::Collect("SM001".to_string()));
        assert!(again.rejected.is_some());
        assert!(again.notices.is_empty());
        assert_eq!(h.app.state().counts().collected, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_advance_reaches_in_transit() {
        let mut h = harness();
        h.app.dispatch(Action::ToggleTracking(true));
        assert_eq!(h.app.state().tracking().step, TrackingStep::Collected);

        tokio::time::sleep(Duration::from_secs(4)).await;
        let outcome = h.app.check_background_tasks();

        assert_eq!(h.app.state().tracking().step, TrackingStep::InTransit);
        assert_eq!(
            h.app.state().pickup("SM001").unwrap().status,
            PickupStatus::InTransit
        );
        assert!(outcome.needs(ViewPart::Tracking));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backing_out_cancels_auto_advance() {
        let mut h = harness();
        h.app.dispatch(Action::ToggleTracking(true));

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.app.check_background_tasks();
        h.app.dispatch(Action::ToggleTracking(false));
        assert_eq!(h.app.state().tracking().step, TrackingStep::Pending);

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.app.check_background_tasks();
            assert_eq!(h.app.state().tracking().step, TrackingStep::Pending);
        }
        // The record itself never rewinds and never advances
        assert_eq!(
            h.app.state().pickup("SM001").unwrap().status,
            PickupStatus::Collected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retoggle_advances_once() {
        let mut h = harness();
        h.app.dispatch(Action::ToggleTracking(true));
        tokio::time::sleep(Duration::from_secs(2)).await;
        h.app.dispatch(Action::ToggleTracking(false));
        h.app.dispatch(Action::ToggleTracking(true));

        // First schedule would have fired at 3s
        tokio::time::sleep(Duration::from_secs(2)).await;
        h.app.check_background_tasks();
        assert_eq!(h.app.state().tracking().step, TrackingStep::Collected);

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.app.check_background_tasks();
        assert_eq!(h.app.state().tracking().step, TrackingStep::InTransit);
        assert_eq!(
            h.app.state().pickup("SM001").unwrap().status,
            PickupStatus::InTransit
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_from_list_starts_auto_advance() {
        let mut h = harness();
        h.app.dispatch(Action::Collect("SM001".to_string()));
        assert_eq!(h.app.state().tracking().step, TrackingStep::Collected);

        tokio::time::sleep(Duration::from_secs(4)).await;
        h.app.check_background_tasks();

        assert_eq!(h.app.state().tracking().step, TrackingStep::InTransit);
        assert_eq!(
            h.app.state().pickup("SM001").unwrap().status,
            PickupStatus::InTransit
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retoggle_after_transit_restores_step() {
        let mut h = harness();
        h.app.dispatch(Action::ToggleTracking(true));
        tokio::time::sleep(Duration::from_secs(4)).await;
        h.app.check_background_tasks();

        h.app.dispatch(Action::ToggleTracking(false));
        assert_eq!(h.app.state().tracking().step, TrackingStep::Pending);

        let outcome = h.app.dispatch(Action::ToggleTracking(true));
        assert!(outcome.rejected.is_none());
        assert_eq!(h.app.state().tracking().step, TrackingStep::InTransit);
        assert_eq!(h.app.state().tracking().collected_at, Some(t0()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        h.app.check_background_tasks();
        assert_eq!(h.app.state().tracking().step, TrackingStep::InTransit);
        assert_eq!(
            h.app.state().pickup("SM001").unwrap().status,
            PickupStatus::InTransit
        );
    }

    #[tokio::test]
    async fn test_elapsed_tick_only_while_collected() {
        let mut h = harness();
        let idle = h.app.handle_event(AppEvent::Tick(TickKind::Elapsed));
        assert!(idle.is_empty());

        h.app.dispatch(Action::ToggleTracking(true));
        let ticking = h.app.handle_event(AppEvent::Tick(TickKind::Elapsed));
        assert!(ticking.needs(ViewPart::Elapsed));
        assert!(!ticking.needs(ViewPart::Clock));
    }

    #[tokio::test]
    async fn test_navigate_and_call_links() {
        let mut h = harness();
        let nav = h.app.dispatch(Action::Navigate("SM001".to_string()));
        assert_eq!(nav.notices[0].level, NoticeLevel::Info);
        assert!(nav.notices[0]
            .message
            .contains("https://www.google.com/maps/dir/?api=1&destination="));

        let call = h.app.dispatch(Action::Call("SM001".to_string()));
        assert!(call.notices[0].message.contains("tel:"));

        let unknown = h.app.dispatch(Action::Call("SM404".to_string()));
        assert_eq!(
            unknown.rejected,
            Some(TransitionError::UnknownPickup("SM404".to_string()))
        );
        assert!(unknown.notices.is_empty());
    }

    #[tokio::test]
    async fn test_chat_reply_is_persisted() {
        let mut h = harness_with(
            Config::default(),
            Arc::new(MemoryStore::new()),
            vec![Ok("Keep it at 2-8°C.".to_string())],
        );
        let outcome = h.app.dispatch(Action::SendMessage("Blood storage?".to_string()));
        assert!(outcome.needs(ViewPart::Chat));
        assert_eq!(h.app.state().pending_turns().len(), 1);

        step(&mut h.app).await;
        let chat = h.app.state().chat();
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].reply, "Keep it at 2-8°C.");
        assert!(!chat[0].is_fallback());
        assert_eq!(stored_chat(&h.store), chat);

        let prompts = h.assistant.prompts.lock().unwrap();
        assert!(prompts[0].contains("User question: \"Blood storage?\""));
    }

    #[tokio::test]
    async fn test_assistant_failure_persists_fallback_turn() {
        let mut h = harness_with(
            Config::default(),
            Arc::new(MemoryStore::new()),
            vec![Err(AssistantError::ServerError("unavailable".to_string()))],
        );
        h.app.dispatch(Action::SendMessage("Is the cooler ok?".to_string()));
        step(&mut h.app).await;

        let chat = h.app.state().chat();
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].user, "Is the cooler ok?");
        assert_eq!(
            chat[0].reply,
            "Sorry, I encountered an error. Please try again later."
        );
        assert!(chat[0].is_fallback());
        assert_eq!(stored_chat(&h.store).len(), 1);
    }

    #[tokio::test]
    async fn test_chat_history_limit_applies() {
        let mut config = Config::default();
        config.performance.chat_history_limit = 3;
        let replies = (0..5).map(|n| Ok(format!("a{}", n))).collect();
        let mut h = harness_with(config, Arc::new(MemoryStore::new()), replies);

        for n in 0..5 {
            h.app.dispatch(Action::SendMessage(format!("q{}", n)));
            step(&mut h.app).await;
        }
        let users: Vec<_> = h.app.state().chat().iter().map(|t| t.user.clone()).collect();
        assert_eq!(users, vec!["q2", "q3", "q4"]);
    }

    #[tokio::test]
    async fn test_blank_message_and_starters() {
        let mut h = harness_with(
            Config::default(),
            Arc::new(MemoryStore::new()),
            vec![Ok("Use a fresh container.".to_string())],
        );
        assert!(h.app.dispatch(Action::SendMessage("   ".to_string())).is_empty());

        h.app.dispatch(Action::SendStarter(1));
        step(&mut h.app).await;
        assert_eq!(h.app.state().chat()[0].user, CHAT_STARTERS[1]);

        let outcome = h.app.dispatch(Action::SendStarter(99));
        assert_eq!(outcome.notices[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_tips_load_is_debounced_and_cached() {
        let mut h = harness();
        h.app.dispatch(Action::ShowSection(Section::Tips));
        assert_eq!(h.app.state().tips_view(), &crate::state::TipsView::Loading);
        // Second trigger while the first is in flight
        h.app.dispatch(Action::LoadTips { force: false });

        step(&mut h.app).await;
        assert_eq!(h.tips.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.app.state().tips().len(), 8);

        // Within the window: served from cache
        h.clock.advance(chrono::Duration::minutes(4));
        h.app.dispatch(Action::LoadTips { force: false });
        assert!(!h.app.is_tips_loading());
        assert_eq!(h.tips.calls.load(Ordering::SeqCst), 1);

        // Past the window: refetched
        h.clock.advance(chrono::Duration::minutes(2));
        h.app.dispatch(Action::LoadTips { force: false });
        step(&mut h.app).await;
        assert_eq!(h.tips.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tips_failure_shows_unavailable() {
        let mut h = harness();
        h.tips.fail.store(true, Ordering::SeqCst);

        h.app.dispatch(Action::LoadTips { force: true });
        let outcome = step(&mut h.app).await;

        assert!(matches!(
            h.app.state().tips_view(),
            crate::state::TipsView::Unavailable(_)
        ));
        assert_eq!(outcome.notices[0].level, NoticeLevel::Error);
        assert!(!h.app.is_tips_loading());

        // Retry succeeds
        h.tips.fail.store(false, Ordering::SeqCst);
        h.app.dispatch(Action::LoadTips { force: true });
        step(&mut h.app).await;
        assert_eq!(h.app.state().tips_view(), &crate::state::TipsView::Ready);
    }

    #[tokio::test]
    async fn test_offline_report_is_queued_and_sent_on_reconnect() {
        let mut h = harness();
        h.probe.set_online(false);
        h.app.handle_event(AppEvent::Tick(TickKind::Connectivity));
        let outcome = step(&mut h.app).await;
        assert_eq!(outcome.notices[0].message, "Working offline");

        h.app.dispatch(Action::UpdateDraft(DraftField::Kind(IssueKind::Temperature)));
        h.app.dispatch(Action::UpdateDraft(DraftField::Priority(Priority::High)));
        h.app.dispatch(Action::UpdateDraft(DraftField::Description(
            "Cooler reads 12°C".to_string(),
        )));
        assert!(h.store.contains("sampleagent_report_drafts"));

        h.app.dispatch(Action::SubmitReport);
        assert_eq!(h.app.state().offline_queue().len(), 1);
        assert!(h.app.state().report_draft().is_empty());
        assert!(!h.store.contains("sampleagent_report_drafts"));
        assert!(h.store.contains("sampleagent_offline_queue"));

        h.probe.set_online(true);
        h.app.handle_event(AppEvent::Tick(TickKind::Connectivity));
        let outcome = step(&mut h.app).await;
        assert_eq!(outcome.notices[0].message, "Connection restored");
        assert!(h.app.state().offline_queue().is_empty());
    }

    #[tokio::test]
    async fn test_report_validation() {
        let mut h = harness();
        let outcome = h.app.dispatch(Action::SubmitReport);
        assert_eq!(outcome.notices[0].level, NoticeLevel::Error);

        h.app.dispatch(Action::UpdateDraft(DraftField::Kind(IssueKind::Access)));
        h.app.dispatch(Action::UpdateDraft(DraftField::Description("x".repeat(501))));
        let outcome = h.app.dispatch(Action::SubmitReport);
        assert_eq!(outcome.notices[0].level, NoticeLevel::Error);
        assert!(!h.app.state().report_draft().is_empty());
    }

    #[tokio::test]
    async fn test_use_current_location_fills_draft() {
        let mut h = harness();
        h.app.dispatch(Action::UseCurrentLocation);
        let outcome = step(&mut h.app).await;

        assert_eq!(
            h.app.state().report_draft().location,
            "Current Location (40.712800, -74.006000)"
        );
        assert!(h.app.state().location().is_some());
        assert_eq!(outcome.notices[0].level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_location_disabled_by_feature_flag() {
        let mut config = Config::default();
        config.features.gps_tracking = false;
        let mut h = harness_with(config, Arc::new(MemoryStore::new()), Vec::new());

        let outcome = h.app.dispatch(Action::UseCurrentLocation);
        assert_eq!(outcome.notices[0].level, NoticeLevel::Error);
        assert!(h.app.state().report_draft().location.is_empty());
    }

    #[tokio::test]
    async fn test_preferences_written_only_at_teardown() {
        let mut h = harness();
        h.app.dispatch(Action::SetTheme(Theme::Dark));
        assert!(!h.store.contains("sampleagent_preferences"));

        let report = h.app.teardown();
        assert!(report.is_complete());

        let stored: Preferences =
            serde_json::from_str(&h.store.get("sampleagent_preferences").unwrap().unwrap())
                .unwrap();
        assert_eq!(stored.theme, Theme::Dark);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let mut h = harness_with(Config::default(), store.clone(), Vec::new());
        h.app.dispatch(Action::Collect("SM002".to_string()));
        h.app.dispatch(Action::Advance("SM002".to_string()));
        h.app.teardown();

        let h2 = harness_with(Config::default(), store, Vec::new());
        assert_eq!(
            h2.app.state().pickup("SM002").unwrap().status,
            PickupStatus::InTransit
        );
    }

    #[tokio::test]
    async fn test_corrupt_pickups_fall_back_to_seed() {
        let store = Arc::new(MemoryStore::new());
        store.set("sampleagent_pickups", "not json").unwrap();
        store
            .set(
                "sampleagent_chat_history",
                &serde_json::to_string(&vec![ChatTurn::answered(t0(), "q".into(), "a".into())])
                    .unwrap(),
            )
            .unwrap();

        let h = harness_with(Config::default(), store, Vec::new());
        assert_eq!(h.app.state().pickups(), seed::pickups(t0()).as_slice());
        assert_eq!(h.app.state().chat().len(), 1);
    }

    #[tokio::test]
    async fn test_elapsed_since_collection() {
        let mut h = harness();
        assert_eq!(h.app.elapsed_since_collection(), None);
        h.app.dispatch(Action::Collect("SM001".to_string()));
        h.clock.advance(chrono::Duration::seconds(125));
        assert_eq!(h.app.elapsed_since_collection().as_deref(), Some("2:05"));
    }

    #[tokio::test]
    async fn test_shortcut_to_report_restores_draft() {
        let mut h = harness();
        h.app.dispatch(Action::UpdateDraft(DraftField::Description("Gate locked".to_string())));
        let outcome = h.app.dispatch(Action::Shortcut(5));
        assert_eq!(h.app.state().section(), Section::Report);
        assert_eq!(outcome.notices[0].message, "Draft restored");
        assert!(h.app.dispatch(Action::Shortcut(9)).is_empty());
    }
}
