//! Derived kinetic landmarks for one well.
//!
//! All landmarks are computed from the *observed* series rather than the
//! fitted curve, so a mediocre sigmoid fit does not distort velocity or
//! plateau estimates. The fitted curve is carried alongside purely for
//! rendering and export.
//!
//! Landmark definitions:
//!
//! - velocity: finite difference of signal over a fixed 3-sample stride,
//!   divided by the matching elapsed-time difference
//! - `max_v` / `max_v_time` / `max_v_signal`: the velocity maximum and the
//!   (time, signal) pair at its index
//! - `lag_time`: x-intercept of the tangent through the max-velocity point
//! - `growth_time`: where that tangent crosses the 95th percentile
//! - `steady_state_time`: first time the signal exceeds the 95th percentile
//! - `steady_state_signal`: mean signal from that crossing to the end

use crate::domain::KineticScalars;
use crate::fit::fitter::FitFailure;
use crate::math::{mean, quantile};

/// Fixed finite-difference stride for the velocity series.
///
/// Three samples smooths single-point read noise without washing out the
/// growth phase at typical kinetic-read intervals. Design constant, not a
/// user knob.
const VELOCITY_STRIDE: usize = 3;

/// Velocity series over a fixed stride: `v[i] = (y[i] - y[i-s]) / (t[i] - t[i-s])`.
///
/// The first `VELOCITY_STRIDE` entries have no lagged partner and are `None`.
pub fn velocity_series(seconds: &[f64], signal: &[f64]) -> Vec<Option<f64>> {
    let n = seconds.len().min(signal.len());
    let mut out = vec![None; n];
    for i in VELOCITY_STRIDE..n {
        let dt = seconds[i] - seconds[i - VELOCITY_STRIDE];
        if dt == 0.0 {
            continue;
        }
        let v = (signal[i] - signal[i - VELOCITY_STRIDE]) / dt;
        if v.is_finite() {
            out[i] = Some(v);
        }
    }
    out
}

/// Compute the full scalar set from an observed series.
///
/// `seconds`/`signal` must be equal-length, time-ordered, and free of
/// missing values (the aggregator guarantees this). A flat or non-rising
/// series (velocity maximum <= 0) is a reported failure: the tangent-line
/// landmarks would otherwise divide by zero.
pub fn derive_scalars(seconds: &[f64], signal: &[f64]) -> Result<KineticScalars, FitFailure> {
    let n = seconds.len().min(signal.len());
    if n <= VELOCITY_STRIDE {
        return Err(FitFailure::TooFewPoints { n });
    }

    let velocities = velocity_series(seconds, signal);

    // First index of the velocity maximum (first-occurrence tie policy).
    let mut max_v = f64::NEG_INFINITY;
    let mut max_idx = None;
    for (i, v) in velocities.iter().enumerate() {
        if let Some(v) = v {
            if *v > max_v {
                max_v = *v;
                max_idx = Some(i);
            }
        }
    }
    let Some(max_idx) = max_idx else {
        return Err(FitFailure::FlatSignal);
    };
    if !(max_v.is_finite() && max_v > 0.0) {
        return Err(FitFailure::FlatSignal);
    }

    let max_v_time = seconds[max_idx];
    let max_v_signal = signal[max_idx];

    // Tangent line through (max_v_time, max_v_signal) with slope max_v.
    let lag_time = max_v_time - max_v_signal / max_v;

    let high_decile = quantile(&signal[..n], 0.95).ok_or(FitFailure::FlatSignal)?;
    let low_decile = quantile(&signal[..n], 0.05).ok_or(FitFailure::FlatSignal)?;

    let growth_time = (high_decile - max_v_signal) / max_v + max_v_time;

    // First crossing of the high decile; if nothing strictly exceeds it
    // (near-constant tail), fall back to the index of the signal maximum.
    let cross_idx = signal[..n]
        .iter()
        .position(|&y| y > high_decile)
        .unwrap_or_else(|| {
            signal[..n]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0)
        });
    let steady_state_time = seconds[cross_idx];
    let steady_state_signal =
        mean(&signal[cross_idx..n]).ok_or(FitFailure::FlatSignal)?;

    let scalars = KineticScalars {
        max_v,
        max_v_time,
        max_v_signal,
        lag_time,
        growth_time,
        steady_state_time,
        steady_state_signal,
        low_decile,
        high_decile,
    };

    let all_finite = [
        scalars.max_v,
        scalars.max_v_time,
        scalars.max_v_signal,
        scalars.lag_time,
        scalars.growth_time,
        scalars.steady_state_time,
        scalars.steady_state_signal,
        scalars.low_decile,
        scalars.high_decile,
    ]
    .iter()
    .all(|v| v.is_finite());
    if !all_finite {
        return Err(FitFailure::NonFinite);
    }

    Ok(scalars)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Linear ramp: y = t, 1s apart.
    fn ramp(n: usize) -> (Vec<f64>, Vec<f64>) {
        let seconds: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let signal = seconds.clone();
        (seconds, signal)
    }

    #[test]
    fn velocity_series_has_stride_lag() {
        let (seconds, signal) = ramp(6);
        let v = velocity_series(&seconds, &signal);
        assert_eq!(v[0], None);
        assert_eq!(v[2], None);
        // Slope of y = t is 1 everywhere.
        for item in &v[3..] {
            assert!((item.unwrap() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn max_v_time_within_observed_range() {
        let seconds: Vec<f64> = (0..30).map(|i| i as f64 * 100.0).collect();
        // Sigmoid-ish: slow, fast, slow.
        let signal: Vec<f64> = seconds
            .iter()
            .map(|&t| 100.0 / (1.0 + (-0.004 * (t - 1500.0)).exp()))
            .collect();
        let s = derive_scalars(&seconds, &signal).unwrap();
        assert!(s.max_v_time >= seconds[0] && s.max_v_time <= *seconds.last().unwrap());
    }

    #[test]
    fn steady_state_after_max_velocity_for_monotone_series() {
        let seconds: Vec<f64> = (0..40).map(|i| i as f64 * 60.0).collect();
        let signal: Vec<f64> = seconds
            .iter()
            .map(|&t| 50.0 / (1.0 + (-0.005 * (t - 1000.0)).exp()))
            .collect();
        let s = derive_scalars(&seconds, &signal).unwrap();
        assert!(s.steady_state_time >= s.max_v_time);
        assert!(s.high_decile >= s.low_decile);
    }

    #[test]
    fn lag_and_growth_follow_tangent_formulas() {
        let (seconds, signal) = ramp(10);
        let s = derive_scalars(&seconds, &signal).unwrap();

        // For y = t: max_v = 1, tangent passes through origin.
        assert!((s.max_v - 1.0).abs() < 1e-12);
        assert!((s.lag_time - (s.max_v_time - s.max_v_signal)).abs() < 1e-12);
        let expect_growth = (s.high_decile - s.max_v_signal) / s.max_v + s.max_v_time;
        assert!((s.growth_time - expect_growth).abs() < 1e-12);
    }

    #[test]
    fn flat_signal_is_a_reported_failure() {
        let seconds: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let signal = vec![5.0; 10];
        assert_eq!(derive_scalars(&seconds, &signal).unwrap_err(), FitFailure::FlatSignal);
    }

    #[test]
    fn decreasing_signal_is_a_reported_failure() {
        let seconds: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let signal: Vec<f64> = (0..10).map(|i| 10.0 - i as f64).collect();
        assert_eq!(derive_scalars(&seconds, &signal).unwrap_err(), FitFailure::FlatSignal);
    }

    #[test]
    fn steady_state_signal_is_trailing_mean() {
        let seconds: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let signal = vec![0.0, 1.0, 2.0, 3.0, 9.0, 9.5, 10.0, 11.0];
        let s = derive_scalars(&seconds, &signal).unwrap();

        let high = quantile(&signal, 0.95).unwrap();
        let idx = signal.iter().position(|&y| y > high).unwrap();
        let expect = signal[idx..].iter().sum::<f64>() / (signal.len() - idx) as f64;
        assert!((s.steady_state_signal - expect).abs() < 1e-12);
        assert_eq!(s.steady_state_time, seconds[idx]);
    }
}
