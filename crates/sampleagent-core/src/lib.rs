//! sampleagent core - field console for medical sample couriers.
//!
//! This crate holds everything below the view layer:
//! - `state`: the single `ApplicationState` with the pickup lifecycle, chat
//!   log, tracking projection and tips view
//! - `persistence`: per-slice hydration and flushing against a `KvStore`
//! - `cache`: `CacheEntry` and the freshness-gated `FreshnessLoader`
//! - `app`: `App`, which applies `dispatch::Action`s and background
//!   `AppEvent`s to the state
//! - `assistant`, `tips`, `device`: the external boundaries as traits, with
//!   HTTP and local implementations
//! - `timer`: the cancellable auto-advance timer and periodic tickers
//!
//! The binary crate owns configuration loading, logging setup and the event
//! loop.

pub mod app;
pub mod assistant;
pub mod cache;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod device;
pub mod dispatch;
pub mod models;
pub mod persistence;
pub mod seed;
pub mod sensors;
pub mod state;
pub mod storage;
pub mod timer;
pub mod tips;
pub mod utils;

pub use app::{App, AppEvent, Services, TickKind};
pub use config::Config;
pub use dispatch::{Action, DispatchOutcome, DraftField, Notice, NoticeLevel, ViewPart};
pub use state::{ApplicationState, Section, TipsView, TrackingStep};
