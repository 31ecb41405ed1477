//! Reporting utilities: formatted terminal output for runs and summaries.

pub mod format;

pub use format::*;
