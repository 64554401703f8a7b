//! Utility functions for string formatting.

pub mod format;

pub use format::{age_display, format_elapsed, format_phone, truncate_string};
