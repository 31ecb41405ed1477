//! Dataset transforms applied between parsing and fitting.

pub mod blanking;

pub use blanking::*;
