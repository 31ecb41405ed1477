//! Levenberg–Marquardt fitting of the logistic model to one well's series.
//!
//! Given time-ordered observations `(t_i, y_i)` we minimize
//!
//! ```text
//! SSE(L, k, x0) = Σ (y_i - f(t_i; L, k, x0))²
//! ```
//!
//! starting from the data-driven guess in [`crate::fit::sigmoid`], with
//! unconstrained parameters and a hard iteration cap so pathological wells
//! cannot stall a batch.
//!
//! Failure here is *soft by design*: a well that will not fit returns a
//! [`FitFailure`] describing why, and the caller excludes that well rather
//! than aborting the run.

use nalgebra::{DMatrix, DVector};

use crate::domain::SigmoidParams;
use crate::fit::sigmoid::{fill_jacobian_row, initial_guess, predict};
use crate::math::solve_least_squares;

/// Iteration cap for the optimizer (resource guard, not a tuning knob).
const MAX_ITERS: usize = 200;

/// Relative SSE improvement below which we declare convergence.
const SSE_RTOL: f64 = 1e-12;

/// Initial damping factor and its adjustment multipliers.
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const LAMBDA_MAX: f64 = 1e12;

/// Why a single well's fit produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FitFailure {
    /// Fewer points than the model can be identified from.
    TooFewPoints { n: usize },
    /// The initial-guess heuristic discarded every point (undefined k0),
    /// or the series has no positive finite maximum.
    UndefinedGuess,
    /// The optimizer hit its iteration cap without converging, or every
    /// damped step was rejected.
    NoConvergence,
    /// The solved parameters or fitted curve were non-finite.
    NonFinite,
    /// Signal never rises: the velocity maximum is zero or negative, so the
    /// tangent-line landmarks are undefined.
    FlatSignal,
}

impl std::fmt::Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitFailure::TooFewPoints { n } => {
                write!(f, "too few points (n={n}, need at least 4)")
            }
            FitFailure::UndefinedGuess => {
                write!(f, "initial-guess heuristic discarded every point")
            }
            FitFailure::NoConvergence => write!(f, "optimizer did not converge"),
            FitFailure::NonFinite => write!(f, "non-finite parameters or fitted values"),
            FitFailure::FlatSignal => write!(f, "flat or non-rising signal (max velocity <= 0)"),
        }
    }
}

impl std::error::Error for FitFailure {}

/// Converged sigmoid parameters plus the fitted curve at the input timepoints.
#[derive(Debug, Clone)]
pub struct SigmoidFit {
    pub params: SigmoidParams,
    pub fitted: Vec<f64>,
    pub sse: f64,
    pub iterations: usize,
}

/// Fit the logistic model to one series by Levenberg–Marquardt.
///
/// `seconds` and `signal` must be equal-length and time-ordered; missing
/// values are excluded upstream.
pub fn fit_sigmoid(seconds: &[f64], signal: &[f64]) -> Result<SigmoidFit, FitFailure> {
    let n = seconds.len().min(signal.len());
    // Three parameters; require at least one extra observation.
    if n < 4 {
        return Err(FitFailure::TooFewPoints { n });
    }
    let seconds = &seconds[..n];
    let signal = &signal[..n];

    let mut params = initial_guess(seconds, signal).ok_or(FitFailure::UndefinedGuess)?;
    let mut sse = sum_squared_error(&params, seconds, signal);
    if !sse.is_finite() {
        return Err(FitFailure::NonFinite);
    }

    let mut lambda = LAMBDA_INIT;
    let mut converged = false;
    let mut iterations = 0usize;

    for iter in 0..MAX_ITERS {
        iterations = iter + 1;

        let Some((jac, residual)) = build_system(&params, seconds, signal) else {
            return Err(FitFailure::NonFinite);
        };

        // Inner loop: raise damping until a step improves the SSE.
        let mut stepped = false;
        while lambda <= LAMBDA_MAX {
            let Some(delta) = damped_step(&jac, &residual, lambda) else {
                lambda *= LAMBDA_UP;
                continue;
            };

            let trial = SigmoidParams {
                l: params.l + delta[0],
                k: params.k + delta[1],
                x0: params.x0 + delta[2],
            };
            let trial_sse = sum_squared_error(&trial, seconds, signal);

            if trial_sse.is_finite() && trial_sse < sse {
                let improvement = (sse - trial_sse) / sse.max(f64::MIN_POSITIVE);
                params = trial;
                sse = trial_sse;
                lambda = (lambda * LAMBDA_DOWN).max(f64::MIN_POSITIVE);
                stepped = true;
                if improvement < SSE_RTOL {
                    converged = true;
                }
                break;
            }
            lambda *= LAMBDA_UP;
        }

        if !stepped {
            // No damping level produced an acceptable step: the gradient is
            // effectively zero, i.e. we are at a (possibly local) minimum.
            converged = true;
            break;
        }
        if converged {
            break;
        }
    }

    if !converged {
        return Err(FitFailure::NoConvergence);
    }
    if !(params.l.is_finite() && params.k.is_finite() && params.x0.is_finite()) {
        return Err(FitFailure::NonFinite);
    }

    let fitted: Vec<f64> = seconds.iter().map(|&t| predict(&params, t)).collect();
    if fitted.iter().any(|v| !v.is_finite()) {
        return Err(FitFailure::NonFinite);
    }

    Ok(SigmoidFit {
        params,
        fitted,
        sse,
        iterations,
    })
}

fn sum_squared_error(params: &SigmoidParams, seconds: &[f64], signal: &[f64]) -> f64 {
    seconds
        .iter()
        .zip(signal.iter())
        .map(|(&t, &y)| {
            let r = y - predict(params, t);
            r * r
        })
        .sum()
}

/// Build the Jacobian and residual vector at the current parameters.
fn build_system(
    params: &SigmoidParams,
    seconds: &[f64],
    signal: &[f64],
) -> Option<(DMatrix<f64>, DVector<f64>)> {
    let n = seconds.len();
    let mut jac = DMatrix::<f64>::zeros(n, 3);
    let mut residual = DVector::<f64>::zeros(n);
    let mut row = [0.0_f64; 3];

    for i in 0..n {
        fill_jacobian_row(params, seconds[i], &mut row);
        if row.iter().any(|v| !v.is_finite()) {
            return None;
        }
        jac[(i, 0)] = row[0];
        jac[(i, 1)] = row[1];
        jac[(i, 2)] = row[2];

        let r = signal[i] - predict(params, seconds[i]);
        if !r.is_finite() {
            return None;
        }
        residual[i] = r;
    }

    Some((jac, residual))
}

/// Solve the damped normal equations as an augmented least-squares problem:
/// `[J; sqrt(λ) diag(sqrt(JᵀJ))] δ = [r; 0]`.
///
/// Scaling the damping by the column norms (Marquardt's variant) keeps the
/// step well-conditioned even though `L`, `k`, and `x0` live on wildly
/// different scales (signal units vs 1/seconds vs seconds).
fn damped_step(jac: &DMatrix<f64>, residual: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let n = jac.nrows();
    let p = jac.ncols();

    let mut aug = DMatrix::<f64>::zeros(n + p, p);
    let mut rhs = DVector::<f64>::zeros(n + p);

    aug.view_mut((0, 0), (n, p)).copy_from(jac);
    rhs.rows_mut(0, n).copy_from(residual);

    for j in 0..p {
        let col_norm = jac.column(j).norm().max(1e-12);
        aug[(n + j, j)] = lambda.sqrt() * col_norm;
    }

    let delta = solve_least_squares(&aug, &rhs)?;
    if delta.iter().all(|v| v.is_finite()) {
        Some(delta)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logistic_series(l: f64, k: f64, x0: f64, n: usize, dt: f64) -> (Vec<f64>, Vec<f64>) {
        let truth = SigmoidParams { l, k, x0 };
        let seconds: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let signal: Vec<f64> = seconds.iter().map(|&t| predict(&truth, t)).collect();
        (seconds, signal)
    }

    #[test]
    fn recovers_known_parameters_on_noiseless_data() {
        let (seconds, signal) = logistic_series(1000.0, 0.002, 4000.0, 60, 200.0);
        let fit = fit_sigmoid(&seconds, &signal).unwrap();

        assert!((fit.params.l - 1000.0).abs() / 1000.0 < 1e-3, "L = {}", fit.params.l);
        assert!((fit.params.k - 0.002).abs() / 0.002 < 1e-3, "k = {}", fit.params.k);
        assert!((fit.params.x0 - 4000.0).abs() / 4000.0 < 1e-3, "x0 = {}", fit.params.x0);

        // Fitted curve reproduces the input within numeric noise.
        for (y, f) in signal.iter().zip(fit.fitted.iter()) {
            assert!((y - f).abs() < 1e-3);
        }
    }

    #[test]
    fn tolerates_mild_noise() {
        let (seconds, mut signal) = logistic_series(500.0, 0.0015, 5000.0, 50, 240.0);
        // Deterministic "noise": small alternating perturbation.
        for (i, y) in signal.iter_mut().enumerate() {
            *y += if i % 2 == 0 { 0.5 } else { -0.5 };
        }
        let fit = fit_sigmoid(&seconds, &signal).unwrap();
        assert!((fit.params.l - 500.0).abs() < 5.0);
        assert!((fit.params.x0 - 5000.0).abs() < 50.0);
    }

    #[test]
    fn rejects_too_short_series() {
        let err = fit_sigmoid(&[0.0, 1.0, 2.0], &[0.1, 0.2, 0.3]).unwrap_err();
        assert_eq!(err, FitFailure::TooFewPoints { n: 3 });
    }

    #[test]
    fn rejects_all_zero_signal() {
        let seconds: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let signal = vec![0.0; 10];
        assert_eq!(fit_sigmoid(&seconds, &signal).unwrap_err(), FitFailure::UndefinedGuess);
    }

    #[test]
    fn iteration_count_is_capped() {
        let (seconds, signal) = logistic_series(100.0, 0.001, 2000.0, 30, 300.0);
        let fit = fit_sigmoid(&seconds, &signal).unwrap();
        assert!(fit.iterations <= MAX_ITERS);
    }
}
