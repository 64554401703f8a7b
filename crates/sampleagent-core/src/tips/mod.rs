//! Health and safety tips source.
//!
//! `TipsSource::fetch` returns the ordered tip list or a `TipsError`. With no
//! endpoint configured, `MockTipsSource` stands in: a fixed delay followed by
//! a shuffle of the built-in tips.

pub mod source;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::models::TipEntry;

pub use source::{HttpTipsSource, MockTipsSource};

#[derive(Error, Debug)]
pub enum TipsError {
    #[error("Tips service returned status {status}")]
    Status { status: u16 },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid tips payload: {0}")]
    InvalidResponse(String),

    #[error("Tips source unavailable: {0}")]
    Unavailable(String),
}

pub trait TipsSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<TipEntry>, TipsError>>;
}
