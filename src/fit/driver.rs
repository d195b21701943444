//! End-to-end fit: rebuild, solve, write back, rebuild.

use nalgebra::DMatrix;

use crate::assemble::{build_model, CompositeModel};
use crate::error::FitError;
use crate::math::{curve_fit, trapezoid, LmOptions};
use crate::models::SubmodelRegistry;
use crate::sheet::{Cell, TabularStore};

/// Everything a single fit produced.
///
/// `model` is the post-fit rebuild, so its free-parameter `fitted`/`error`
/// vectors reflect the sheet after write-back. Discarded freely; the store
/// holds the durable results.
#[derive(Debug, Clone)]
pub struct FitReport {
    pub model: CompositeModel,
    /// Fitted free-parameter values, in slot order.
    pub fitted: Vec<f64>,
    /// One-standard-deviation errors (sqrt of the covariance diagonal).
    pub errors: Vec<f64>,
    pub covariance: DMatrix<f64>,
    /// Trapezoidal integral of `|y - model(x, fitted)|` over x.
    pub residue: f64,
}

/// Fit the sheet's model to `(x, y)` and write results back.
///
/// Steps: assemble the model (any assembly error aborts before the solver
/// runs), solve the bounded least-squares problem from the guess vector,
/// write every free parameter's fitted value and error into all of its
/// bound rows, rebuild so fixed/linked cells reflect the fit, then save the
/// store unless `save` is false.
pub fn fit(
    store: &mut impl TabularStore,
    registry: &SubmodelRegistry,
    x: &[f64],
    y: &[f64],
    sigma: Option<&[f64]>,
    save: bool,
) -> Result<FitReport, FitError> {
    if x.len() != y.len() {
        return Err(FitError::InvalidData {
            message: format!("x has {} points but y has {}.", x.len(), y.len()),
        });
    }
    if let Some(s) = sigma {
        if s.len() != x.len() {
            return Err(FitError::InvalidData {
                message: format!("sigma has {} points but x has {}.", s.len(), x.len()),
            });
        }
        if let Some(bad) = s.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(FitError::InvalidData {
                message: format!("sigma values must be finite and positive, got {bad}."),
            });
        }
    }

    let model = build_model(store, registry)?;

    let lm = curve_fit(
        |xi, p| model.eval(xi, p),
        x,
        y,
        sigma,
        &model.free.guess,
        &model.free.min,
        &model.free.max,
        &LmOptions::default(),
    )?;

    let errors: Vec<f64> = (0..lm.params.len())
        .map(|i| lm.covariance[(i, i)].max(0.0).sqrt())
        .collect();

    let y_fit = model.eval_all(x, &lm.params);
    let abs_dev: Vec<f64> = y
        .iter()
        .zip(&y_fit)
        .map(|(yi, fi)| (yi - fi).abs())
        .collect();
    let residue = trapezoid(&abs_dev, x);

    // Write every free parameter into all of its bound rows.
    for (slot, rows) in model.free.rows.iter().enumerate() {
        for &row in rows {
            store.set_cell_value(Cell::Number(lm.params[slot]), row, model.header.fitted);
            store.set_cell_value(Cell::Number(errors[slot]), row, model.header.error);
        }
    }

    // Full rebuild so fixed/linked values and the returned model reflect
    // the new fit.
    let model = build_model(store, registry)?;

    if save {
        store.save()?;
    }

    Ok(FitReport {
        model,
        fitted: lm.params,
        errors,
        covariance: lm.covariance,
        residue,
    })
}
