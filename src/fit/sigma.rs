//! Per-point uncertainty construction.
//!
//! With the solver's convention (`chisq = Σ ((y_i - f(x_i)) / σ_i)²`),
//! a uniform sigma array with selectively larger values is a convenient way
//! to downweight x-ranges (artifacts, excluded windows) without masking
//! points outright.

use crate::error::FitError;
use crate::math::nearest_index;

/// A constant sigma override over one x-subrange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmaRange {
    pub x_start: f64,
    pub x_stop: f64,
    pub sigma: f64,
}

/// Build a sigma array: `sigma` everywhere, then each override applied over
/// `[x_start, x_stop)` mapped to indices by nearest-value lookup.
pub fn uniform_sigma(
    x: &[f64],
    sigma: f64,
    overrides: &[SigmaRange],
) -> Result<Vec<f64>, FitError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(FitError::InvalidData {
            message: format!("sigma must be finite and positive, got {sigma}."),
        });
    }

    let mut out = vec![sigma; x.len()];
    for r in overrides {
        if !(r.sigma.is_finite() && r.sigma > 0.0) {
            return Err(FitError::InvalidData {
                message: format!(
                    "sigma override for [{}, {}) must be finite and positive, got {}.",
                    r.x_start, r.x_stop, r.sigma
                ),
            });
        }
        let start = nearest_index(x, r.x_start);
        let stop = nearest_index(x, r.x_stop);
        for s in out.iter_mut().take(stop).skip(start) {
            *s = r.sigma;
        }
    }
    Ok(out)
}
