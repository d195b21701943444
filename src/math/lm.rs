//! Bounded nonlinear least-squares via Levenberg–Marquardt.
//!
//! Minimizes `Σ ((f(x_i, p) - y_i) / σ_i)²` over `p` subject to box
//! constraints `lo ≤ p ≤ hi`:
//!
//! - the Jacobian is a forward finite difference (stepping backward at an
//!   upper bound so evaluations stay inside the box)
//! - each damped Gauss–Newton step is clamped onto the box before the
//!   accept/reject test, so iterates never leave the feasible region
//! - the normal equations use SVD with a tolerance fallback, since nearly
//!   redundant parameters make them ill-conditioned
//!
//! The covariance follows the usual curve-fit convention: the
//! pseudo-inverse of `JᵀJ` (weighted) scaled by the reduced chi-square, so
//! `sqrt(diag)` are one-standard-deviation parameter errors.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// Solver knobs. The defaults suit lab-scale fits (tens of parameters,
/// thousands of points).
#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Relative cost-decrease tolerance.
    pub ftol: f64,
    /// Step-size tolerance (max absolute component).
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        LmOptions {
            max_iter: 200,
            ftol: 1e-10,
            xtol: 1e-10,
        }
    }
}

/// Converged fit: parameter vector and covariance matrix.
#[derive(Debug, Clone)]
pub struct LmFit {
    pub params: Vec<f64>,
    pub covariance: DMatrix<f64>,
}

/// Fit `f(x, params)` to `(x, y)` from `guess`, within `[lo, hi]`.
///
/// `sigma`, when given, holds per-point standard deviations of `y`;
/// residuals are weighted by `1/σ`. A guess outside the bounds or a failure
/// to converge is a [`FitError::SolverFailure`].
pub fn curve_fit<F>(
    f: F,
    x: &[f64],
    y: &[f64],
    sigma: Option<&[f64]>,
    guess: &[f64],
    lo: &[f64],
    hi: &[f64],
    opts: &LmOptions,
) -> Result<LmFit, FitError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x.len();
    let m = guess.len();
    if m == 0 {
        return Ok(LmFit {
            params: Vec::new(),
            covariance: DMatrix::zeros(0, 0),
        });
    }
    if n < m {
        return Err(FitError::SolverFailure {
            message: format!("{n} data points cannot determine {m} parameters."),
        });
    }

    for i in 0..m {
        if !(lo[i] <= guess[i] && guess[i] <= hi[i]) {
            return Err(FitError::SolverFailure {
                message: format!(
                    "initial guess {} for parameter {i} violates bounds [{}, {}].",
                    guess[i], lo[i], hi[i]
                ),
            });
        }
    }

    let weights: Vec<f64> = match sigma {
        Some(s) => s.iter().map(|&v| 1.0 / v).collect(),
        None => vec![1.0; n],
    };

    let residuals = |p: &[f64]| -> DVector<f64> {
        DVector::from_iterator(
            n,
            x.iter()
                .zip(y.iter())
                .zip(weights.iter())
                .map(|((&xi, &yi), &wi)| (f(xi, p) - yi) * wi),
        )
    };

    let mut p: Vec<f64> = guess.to_vec();
    let mut r = residuals(&p);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(FitError::SolverFailure {
            message: "model is non-finite at the initial guess.".to_string(),
        });
    }

    let mut lambda = 1e-3;
    let mut converged = false;

    for _ in 0..opts.max_iter {
        let jac = jacobian(&|q: &[f64]| residuals(q), &p, lo, hi, &r);
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &r;

        // Inner loop: raise the damping until a step reduces the cost.
        let mut stepped = false;
        while lambda < 1e12 {
            let mut damped = jtj.clone();
            for i in 0..m {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }

            let Some(delta) = solve(&damped, &(-&jtr)) else {
                lambda *= 10.0;
                continue;
            };

            let mut p_new = p.clone();
            for i in 0..m {
                p_new[i] = (p[i] + delta[i]).clamp(lo[i], hi[i]);
            }

            let r_new = residuals(&p_new);
            let cost_new = r_new.norm_squared();
            if cost_new.is_finite() && cost_new <= cost {
                let step: f64 = p_new
                    .iter()
                    .zip(p.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                let improved = cost - cost_new;

                p = p_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda * 0.1).max(1e-12);
                stepped = true;

                if improved <= opts.ftol * cost.max(1e-300) || step <= opts.xtol {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if converged {
            break;
        }
        if !stepped {
            // Damping exhausted without any acceptable step: we are at a
            // (possibly constrained) stationary point.
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(FitError::SolverFailure {
            message: format!("no convergence after {} iterations.", opts.max_iter),
        });
    }

    let jac = jacobian(&|q: &[f64]| residuals(q), &p, lo, hi, &r);
    let covariance = covariance_matrix(&jac, cost, n, m)?;

    Ok(LmFit {
        params: p,
        covariance,
    })
}

/// Forward-difference Jacobian of the residual vector, stepping backward
/// when a forward step would leave the box.
fn jacobian<R>(residuals: &R, p: &[f64], lo: &[f64], hi: &[f64], r0: &DVector<f64>) -> DMatrix<f64>
where
    R: Fn(&[f64]) -> DVector<f64>,
{
    let n = r0.len();
    let m = p.len();
    let mut jac = DMatrix::zeros(n, m);

    for j in 0..m {
        let mut h = f64::EPSILON.sqrt() * p[j].abs().max(1.0);
        if p[j] + h > hi[j] {
            h = -h;
        }
        let mut p_step = p.to_vec();
        p_step[j] = (p[j] + h).clamp(lo[j], hi[j]);
        let h_actual = p_step[j] - p[j];
        if h_actual == 0.0 {
            continue; // degenerate bound interval, column stays zero
        }

        let r_step = residuals(&p_step);
        for i in 0..n {
            jac[(i, j)] = (r_step[i] - r0[i]) / h_actual;
        }
    }

    jac
}

fn solve(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    for &tol in &[1e-12, 1e-9, 1e-6] {
        if let Ok(delta) = svd.solve(b, tol) {
            if delta.iter().all(|v| v.is_finite()) {
                return Some(delta);
            }
        }
    }
    None
}

fn covariance_matrix(
    jac: &DMatrix<f64>,
    cost: f64,
    n: usize,
    m: usize,
) -> Result<DMatrix<f64>, FitError> {
    let jtj = jac.transpose() * jac;
    let inv = jtj
        .pseudo_inverse(1e-12)
        .map_err(|e| FitError::SolverFailure {
            message: format!("covariance computation failed: {e}"),
        })?;

    // Reduced chi-square scaling; with n == m the errors are formally
    // undefined, so leave the unscaled inverse.
    let dof = n.saturating_sub(m);
    let scale = if dof > 0 { cost / dof as f64 } else { 1.0 };
    Ok(inv * scale)
}
