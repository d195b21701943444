//! Builtin submodel shapes.
//!
//! The usual peak and background functions for spectroscopy-style fits.
//! Hosts with bespoke shapes register their own [`Submodel`]s alongside
//! (or instead of) these.

use crate::error::FitError;
use crate::models::registry::{Submodel, SubmodelRegistry};

/// `amplitude * exp(-(x - center)^2 / (2 sigma^2))`
pub fn gauss(x: f64, params: &[f64]) -> f64 {
    let (amplitude, center, sigma) = (params[0], params[1], params[2]);
    let d = x - center;
    amplitude * (-d * d / (2.0 * sigma * sigma)).exp()
}

/// `amplitude * width^2 / ((x - center)^2 + width^2)`
pub fn lorentz(x: f64, params: &[f64]) -> f64 {
    let (amplitude, center, width) = (params[0], params[1], params[2]);
    let d = x - center;
    amplitude * width * width / (d * d + width * width)
}

/// `slope * x + intercept`
pub fn linear(x: f64, params: &[f64]) -> f64 {
    params[0] * x + params[1]
}

/// `amplitude * exp(rate * x)`
pub fn exponential(x: f64, params: &[f64]) -> f64 {
    params[0] * (params[1] * x).exp()
}

/// `value` (flat background)
pub fn constant(_x: f64, params: &[f64]) -> f64 {
    params[0]
}

/// Registry pre-loaded with the builtin shapes.
pub fn default_registry() -> Result<SubmodelRegistry, FitError> {
    let mut registry = SubmodelRegistry::new();
    registry.register(Submodel::new("gauss", &["amplitude", "center", "sigma"], gauss))?;
    registry.register(Submodel::new("lorentz", &["amplitude", "center", "width"], lorentz))?;
    registry.register(Submodel::new("linear", &["slope", "intercept"], linear))?;
    registry.register(Submodel::new("exponential", &["amplitude", "rate"], exponential))?;
    registry.register(Submodel::new("constant", &["value"], constant))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_peaks_at_center() {
        let params = [2.0, 5.0, 1.0];
        assert!((gauss(5.0, &params) - 2.0).abs() < 1e-12);
        assert!(gauss(8.0, &params) < gauss(5.5, &params));
    }

    #[test]
    fn lorentz_half_max_at_center_plus_width() {
        let params = [2.0, 0.0, 3.0];
        assert!((lorentz(3.0, &params) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn default_registry_declares_argument_order() {
        let registry = default_registry().unwrap();
        let gauss = registry.resolve("gauss").unwrap();
        assert_eq!(gauss.args(), ["amplitude", "center", "sigma"]);
        assert!((gauss.eval(1.0, &[3.0, 1.0, 0.5]) - 3.0).abs() < 1e-12);
    }
}
