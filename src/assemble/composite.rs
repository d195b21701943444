//! Typed composite model and free-parameter bookkeeping.

use crate::error::FitError;
use crate::models::SubmodelFn;
use crate::sheet::HeaderMap;

/// Identifier of one free parameter.
///
/// `P(n)` renders as `p<n>`: a parameter fit independently. `X(n)` renders
/// as `x<n>`: a parameter shared by every argument whose link chain
/// terminates at the same free target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId {
    P(usize),
    X(usize),
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamId::P(n) => write!(f, "p{n}"),
            ParamId::X(n) => write!(f, "x{n}"),
        }
    }
}

/// One resolved argument position of a submodel term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedArg {
    /// Fixed value substituted directly into the model.
    Literal(f64),
    /// Index into the free-parameter vector.
    Free(usize),
}

/// One active submodel instance with its resolved argument list, in the
/// registry's declared argument order.
#[derive(Debug, Clone)]
pub struct SubmodelTerm {
    /// Instance name as written in the sheet (`gauss#2`).
    pub instance: String,
    /// Registered base name (`gauss`).
    pub base: String,
    pub func: SubmodelFn,
    pub args: Vec<ResolvedArg>,
}

/// The ordered free-parameter vectors plus write-back bookkeeping.
///
/// All vectors are indexed by free-parameter slot; `rows[i]` lists the
/// 1-based sheet rows bound to slot `i` (every row carrying its id, and
/// therefore every row that receives its fitted value and error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeParams {
    pub ids: Vec<ParamId>,
    pub guess: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub fitted: Vec<f64>,
    pub error: Vec<f64>,
    pub rows: Vec<Vec<usize>>,
}

impl FreeParams {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifier strings in slot order (`["p0", "x0", "p1", ...]`).
    pub fn id_strings(&self) -> Vec<String> {
        self.ids.iter().map(|id| id.to_string()).collect()
    }
}

/// The assembled composite model: `y(x) = Σ term_i(x, resolved args)`.
///
/// Rebuilt fully on every fit; owns no state beyond the resolved terms and
/// the free-parameter vectors.
#[derive(Debug, Clone)]
pub struct CompositeModel {
    pub terms: Vec<SubmodelTerm>,
    pub free: FreeParams,
    /// Header layout of the store the model was assembled from, reused for
    /// write-back.
    pub header: HeaderMap,
}

impl CompositeModel {
    /// Evaluate the composite model at `x` with the given free-parameter
    /// values.
    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        let mut buf = Vec::new();
        self.terms
            .iter()
            .map(|term| Self::eval_term(term, x, params, &mut buf))
            .sum()
    }

    /// Evaluate over a grid.
    pub fn eval_all(&self, xs: &[f64], params: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x, params)).collect()
    }

    fn eval_term(term: &SubmodelTerm, x: f64, params: &[f64], buf: &mut Vec<f64>) -> f64 {
        buf.clear();
        buf.extend(term.args.iter().map(|arg| match arg {
            ResolvedArg::Literal(v) => *v,
            ResolvedArg::Free(i) => params[*i],
        }));
        (term.func)(x, buf)
    }

    /// Single-submodel curve with each free parameter at its guess value.
    pub fn guess_curve(&self, instance: &str, xs: &[f64]) -> Result<Vec<f64>, FitError> {
        self.submodel_curve(instance, xs, &self.free.guess)
    }

    /// Single-submodel curve with each free parameter at its last-fitted
    /// value.
    pub fn fitted_curve(&self, instance: &str, xs: &[f64]) -> Result<Vec<f64>, FitError> {
        self.submodel_curve(instance, xs, &self.free.fitted)
    }

    fn submodel_curve(
        &self,
        instance: &str,
        xs: &[f64],
        params: &[f64],
    ) -> Result<Vec<f64>, FitError> {
        let term = self
            .terms
            .iter()
            .find(|t| t.instance == instance)
            .ok_or_else(|| FitError::UnknownSubmodel {
                name: instance.to_string(),
            })?;
        let mut buf = Vec::new();
        Ok(xs
            .iter()
            .map(|&x| Self::eval_term(term, x, params, &mut buf))
            .collect())
    }

    /// Textual rendering of the model, e.g. `gauss(x, p0, 5) + linear(x, x0, 0)`.
    ///
    /// Display/diagnostics only; evaluation never goes through text.
    pub fn expression(&self) -> String {
        let terms: Vec<String> = self
            .terms
            .iter()
            .map(|term| {
                let args: Vec<String> = term
                    .args
                    .iter()
                    .map(|arg| match arg {
                        ResolvedArg::Literal(v) => format!("{v}"),
                        ResolvedArg::Free(i) => self.free.ids[*i].to_string(),
                    })
                    .collect();
                format!("{}(x, {})", term.base, args.join(", "))
            })
            .collect();
        terms.join(" + ")
    }
}
