//! Named actions and what the view should do after one is applied.
//!
//! Every user intent the console understands is an `Action`. `App::dispatch`
//! maps each one to state operations and returns a `DispatchOutcome`: the
//! notices to show and the parts of the view that changed. Nothing here
//! depends on how the view is drawn.

use crate::models::{IssueKind, Priority, Theme, TipCategory};
use crate::state::{Section, TransitionError};

#[derive(Debug, Clone, PartialEq)]
pub enum DraftField {
    Kind(IssueKind),
    Priority(Priority),
    Location(String),
    Description(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ShowSection(Section),
    /// Numbered section shortcut, 1-based
    Shortcut(u8),

    Collect(String),
    Advance(String),
    Cancel(String),
    /// Directions to a pickup's facility
    Navigate(String),
    /// Phone the facility contact
    Call(String),
    /// Mark the active pickup collected (true) or back out (false).
    ToggleTracking(bool),
    RefreshSensors,

    SendMessage(String),
    /// Send one of the suggested questions by index
    SendStarter(usize),

    LoadTips { force: bool },
    FilterTips(Option<TipCategory>),

    UpdateDraft(DraftField),
    UseCurrentLocation,
    SubmitReport,
    ClearReport,

    SetTheme(Theme),
    SetNotifications(bool),
    SetVoice(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Parts of the view that need redrawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewPart {
    Section,
    Pickups,
    Counts,
    Tracking,
    /// Time since collection on the tracking view
    Elapsed,
    Sensors,
    Clock,
    Chat,
    Tips,
    Report,
    Connectivity,
    Preferences,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub notices: Vec<Notice>,
    pub refresh: Vec<ViewPart>,
    /// Set when a pickup transition was refused. Not an error to show.
    pub rejected: Option<TransitionError>,
}

impl DispatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notice(&mut self, level: NoticeLevel, message: impl Into<String>) -> &mut Self {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
        self
    }

    pub fn refresh(&mut self, part: ViewPart) -> &mut Self {
        if !self.refresh.contains(&part) {
            self.refresh.push(part);
        }
        self
    }

    pub fn merge(&mut self, other: DispatchOutcome) {
        self.notices.extend(other.notices);
        for part in other.refresh {
            self.refresh(part);
        }
        if other.rejected.is_some() {
            self.rejected = other.rejected;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty() && self.refresh.is_empty() && self.rejected.is_none()
    }

    pub fn needs(&self, part: ViewPart) -> bool {
        self.refresh.contains(&part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_dedups_refresh_parts() {
        let mut a = DispatchOutcome::new();
        a.refresh(ViewPart::Chat).refresh(ViewPart::Counts);

        let mut b = DispatchOutcome::new();
        b.refresh(ViewPart::Chat)
            .notice(NoticeLevel::Info, "Working offline");

        a.merge(b);
        assert_eq!(a.refresh, vec![ViewPart::Chat, ViewPart::Counts]);
        assert_eq!(a.notices.len(), 1);
        assert!(!a.is_empty());
        assert!(DispatchOutcome::new().is_empty());
    }
}
