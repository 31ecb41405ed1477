//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - plate/measurement primitives (`Well`, `Channel`, `Measurement`, `PlateMap`)
//! - run configuration (`AnalysisConfig`, `SignalSource`, `PlateMapFormat`)
//! - fit outputs (`SigmoidParams`, `KineticScalars`, `WellFit`, `SummaryRow`)

pub mod types;

pub use types::*;
