//! Name → function registry with declared argument lists.

use crate::error::FitError;

/// A submodel function: independent variable first, then the declared
/// arguments in order.
pub type SubmodelFn = fn(f64, &[f64]) -> f64;

/// One registered submodel: a name, its argument names, and the function.
#[derive(Debug, Clone)]
pub struct Submodel {
    name: String,
    args: Vec<String>,
    func: SubmodelFn,
}

impl Submodel {
    pub fn new(name: impl Into<String>, args: &[&str], func: SubmodelFn) -> Self {
        Submodel {
            name: name.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared argument names, excluding the independent variable.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn func(&self) -> SubmodelFn {
        self.func
    }

    /// Evaluate at `x` with `params` in declared-argument order.
    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        (self.func)(x, params)
    }
}

/// Instance names may carry a `#tag` suffix (`gauss#2`); the portion before
/// `#` is the registered base name.
pub fn base_name(instance: &str) -> &str {
    instance.split('#').next().unwrap_or(instance)
}

/// Ordered collection of registered submodels.
///
/// Registration order is preserved (it has no semantic weight, but keeps
/// diagnostics deterministic). Lookup is by exact base name.
#[derive(Debug, Clone, Default)]
pub struct SubmodelRegistry {
    entries: Vec<Submodel>,
}

impl SubmodelRegistry {
    pub fn new() -> Self {
        SubmodelRegistry::default()
    }

    /// Register a submodel; duplicate names are rejected.
    pub fn register(&mut self, submodel: Submodel) -> Result<(), FitError> {
        if self.resolve(submodel.name()).is_some() {
            return Err(FitError::DuplicateSubmodel {
                name: submodel.name().to_string(),
            });
        }
        self.entries.push(submodel);
        Ok(())
    }

    /// Look up by exact base name.
    pub fn resolve(&self, name: &str) -> Option<&Submodel> {
        self.entries.iter().find(|s| s.name() == name)
    }

    /// Look up an instance name, stripping any `#tag` suffix.
    pub fn resolve_instance(&self, instance: &str) -> Option<&Submodel> {
        self.resolve(base_name(instance))
    }
}
