//! Utility functions for string formatting and manipulation.

pub mod format;

pub use format::{contains_ignore_case, excerpt, format_date, strip_html, truncate};
