//! Kinetic curve fitting.
//!
//! Responsibilities:
//!
//! - logistic model evaluation + data-driven initial guesses (`sigmoid`)
//! - Levenberg–Marquardt nonlinear least squares (`fitter`)
//! - derived kinetic landmarks from the observed series (`kinetics`)
//! - per-well fan-out / fan-in over a dataset (`aggregate`)

pub mod aggregate;
pub mod fitter;
pub mod kinetics;
pub mod sigmoid;

pub use aggregate::*;
pub use fitter::*;
pub use kinetics::*;
pub use sigmoid::*;
