//! Linear least-squares solver.
//!
//! The Levenberg–Marquardt fitter repeatedly solves small damped linear
//! systems of the form:
//!
//! ```text
//! minimize ||J δ - r||² + λ ||D δ||²
//! ```
//!
//! which we express as an ordinary least-squares problem on the augmented
//! system `[J; sqrt(λ) D] δ = [r; 0]`.
//!
//! Implementation choices:
//! - We use SVD to solve the least-squares problem robustly even when the
//!   design matrix is tall (more rows than columns).
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic
//!   for non-square matrices.)
//! - Because our parameter dimension is tiny (3 columns), SVD performance is
//!   irrelevant next to the per-well iteration count.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    // Sigmoid Jacobians go nearly rank-deficient when the data barely
    // constrains a parameter (e.g. a series that never saturates pins L
    // poorly), so try progressively looser tolerances before giving up.
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
