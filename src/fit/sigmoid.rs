//! Three-parameter logistic model.
//!
//! The fitter relies on three primitive operations:
//! - predict `f(t)` given parameters (for residuals/exports)
//! - fill a Jacobian row at `t` (for the Gauss–Newton step)
//! - build an initial guess from the observed series (for convergence)
//!
//! Numerical notes:
//! - The logistic `1/(1+exp(-z))` is evaluated in the branch-stable form
//!   (separate expressions for `z >= 0` and `z < 0`) so large `|z|` never
//!   produces `exp` overflow followed by `inf/inf`.

use crate::domain::SigmoidParams;

/// Numerically stable standard logistic `σ(z) = 1 / (1 + exp(-z))`.
fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Predict `f(t) = L / (1 + exp(-k (t - x0)))`.
pub fn predict(p: &SigmoidParams, t: f64) -> f64 {
    p.l * logistic(p.k * (t - p.x0))
}

/// Fill one Jacobian row `[∂f/∂L, ∂f/∂k, ∂f/∂x0]` at time `t`.
///
/// With `s = σ(k (t - x0))`:
///
/// - `∂f/∂L  = s`
/// - `∂f/∂k  = L s (1 - s) (t - x0)`
/// - `∂f/∂x0 = -L s (1 - s) k`
pub fn fill_jacobian_row(p: &SigmoidParams, t: f64, out: &mut [f64; 3]) {
    let s = logistic(p.k * (t - p.x0));
    let ds = s * (1.0 - s);
    out[0] = s;
    out[1] = p.l * ds * (t - p.x0);
    out[2] = -p.l * ds * p.k;
}

/// Data-driven initial guess for `(L, k, x0)`.
///
/// Heuristic (kept bit-compatible in structure with the established analysis
/// workflow so fits converge to the same optima):
///
/// - `L0  = max(signal)`
/// - `x0₀ = max(seconds) / 4`
/// - `k0  = -mean[ ln(L0·1.1 / y - 1) / (t - x0₀) ]` over the points where
///   the log argument is positive and the whole term finite; invalid points
///   are silently dropped from the mean, not treated as failures.
///
/// Returns `None` when the series is empty, `L0` is not a positive finite
/// value, or every point was dropped (undefined `k0`).
pub fn initial_guess(seconds: &[f64], signal: &[f64]) -> Option<SigmoidParams> {
    let l0 = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let t_max = seconds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !l0.is_finite() || l0 <= 0.0 || !t_max.is_finite() {
        return None;
    }
    let x0 = t_max / 4.0;

    let mut sum = 0.0;
    let mut n = 0usize;
    for (&t, &y) in seconds.iter().zip(signal.iter()) {
        let arg = l0 * 1.1 / y - 1.0;
        if !(arg.is_finite() && arg > 0.0) {
            continue;
        }
        let term = arg.ln() / (t - x0);
        if !term.is_finite() {
            continue;
        }
        sum += term;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let k = -(sum / n as f64);
    if !k.is_finite() {
        return None;
    }

    Some(SigmoidParams { l: l0, k, x0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_limits() {
        let p = SigmoidParams { l: 100.0, k: 0.01, x0: 3000.0 };
        // Far left: near 0. Far right: near L. Midpoint: L/2.
        assert!(predict(&p, -1e6) < 1e-6);
        assert!((predict(&p, 1e7) - 100.0).abs() < 1e-6);
        assert!((predict(&p, 3000.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let p = SigmoidParams { l: 80.0, k: 0.002, x0: 4000.0 };
        let t = 3500.0;
        let mut row = [0.0; 3];
        fill_jacobian_row(&p, t, &mut row);

        let h = 1e-6;
        let fd_l = (predict(&SigmoidParams { l: p.l + h, ..p }, t) - predict(&p, t)) / h;
        let fd_k = (predict(&SigmoidParams { k: p.k + h * 1e-3, ..p }, t) - predict(&p, t)) / (h * 1e-3);
        let fd_x0 = (predict(&SigmoidParams { x0: p.x0 + h, ..p }, t) - predict(&p, t)) / h;

        assert!((row[0] - fd_l).abs() < 1e-5);
        assert!((row[1] - fd_k).abs() < 1e-2);
        assert!((row[2] - fd_x0).abs() < 1e-5);
    }

    #[test]
    fn initial_guess_is_in_the_right_ballpark() {
        let truth = SigmoidParams { l: 100.0, k: 0.003, x0: 3000.0 };
        let seconds: Vec<f64> = (0..40).map(|i| i as f64 * 300.0).collect();
        let signal: Vec<f64> = seconds.iter().map(|&t| predict(&truth, t)).collect();

        let guess = initial_guess(&seconds, &signal).unwrap();
        assert!(guess.l > 90.0 && guess.l <= 100.0);
        assert!(guess.k > 0.0, "k0 should be positive for a rising series");
        assert!((guess.x0 - seconds.last().unwrap() / 4.0).abs() < 1e-9);
    }

    #[test]
    fn initial_guess_fails_on_degenerate_series() {
        // All-zero signal: every log argument is undefined.
        let seconds = [0.0, 1.0, 2.0];
        let signal = [0.0, 0.0, 0.0];
        assert!(initial_guess(&seconds, &signal).is_none());
        assert!(initial_guess(&[], &[]).is_none());
    }
}
