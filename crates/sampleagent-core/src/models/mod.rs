//! Data models for the field console.
//!
//! - `PickupRecord` with its `Priority` and `PickupStatus` lifecycle
//! - `ChatTurn`: one exchange with the assistant
//! - `TipEntry`: health and safety tips, grouped by `TipCategory`
//! - `ReportDraft` / `IncidentReport`: the incident report form
//! - `Location`, `Preferences`
//!
//! Field names on the wire follow the browser dashboard's storage format so
//! previously persisted data keeps decoding.

pub mod chat;
pub mod location;
pub mod pickup;
pub mod preferences;
pub mod report;
pub mod tip;

pub use chat::{ChatTurn, PendingTurn, ReplyOutcome};
pub use location::Location;
pub use pickup::{Coordinates, PickupRecord, PickupStatus, Priority};
pub use preferences::{Preferences, Theme};
pub use report::{IncidentReport, IssueKind, ReportDraft, ReportError, MAX_DESCRIPTION_LENGTH};
pub use tip::{filter_tips, TipCategory, TipEntry, TipPriority};
