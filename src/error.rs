//! Crate-wide error type.
//!
//! Every fallible operation in the crate returns `Result<_, FitError>`.
//! Variants carry the names needed for actionable messages (which submodel,
//! which argument, which identifiers), since assembly failures usually point
//! at a specific cell of the parameter sheet.

/// Errors raised while reading the sheet, assembling the model, or fitting.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// The header row lacks one of the required named columns.
    MissingColumn { name: String },

    /// A data row violates the table contract (e.g. submodel without arg).
    InvalidRow { row: usize, message: String },

    /// A submodel name in the sheet has no registered function.
    UnknownSubmodel { name: String },

    /// Two registrations under the same submodel name.
    DuplicateSubmodel { name: String },

    /// An active submodel has no use-case with `use = y` for a required
    /// argument.
    MissingArgument { submodel: String, arg: String },

    /// A `vary` link references a (submodel, arg) pair absent from the
    /// parameter table.
    UnresolvedLink {
        submodel: String,
        arg: String,
        target_submodel: String,
        target_arg: String,
    },

    /// A `vary` link chain revisits a (submodel, arg) pair.
    ///
    /// `chain` lists `submodel.arg` entries in traversal order, ending with
    /// the pair that was seen twice.
    LinkCycle { chain: Vec<String> },

    /// Free or fixed parameters with no guess value.
    MissingGuess { ids: Vec<String> },

    /// Input arrays that cannot be fit (length mismatch, bad sigma, ...).
    InvalidData { message: String },

    /// The least-squares solver failed to converge or rejected the start
    /// point. Propagated verbatim; never locally recovered.
    SolverFailure { message: String },

    /// Store persistence failure.
    Io { message: String },
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::MissingColumn { name } => {
                write!(f, "Header row is missing required column '{name}'.")
            }
            FitError::InvalidRow { row, message } => {
                write!(f, "Invalid row {row}: {message}")
            }
            FitError::UnknownSubmodel { name } => {
                write!(f, "No registered submodel named '{name}'.")
            }
            FitError::DuplicateSubmodel { name } => {
                write!(f, "Submodel '{name}' is already registered.")
            }
            FitError::MissingArgument { submodel, arg } => {
                write!(f, "Submodel '{submodel}' is missing argument '{arg}'.")
            }
            FitError::UnresolvedLink {
                submodel,
                arg,
                target_submodel,
                target_arg,
            } => {
                write!(
                    f,
                    "Cannot resolve link from '{submodel}.{arg}': \
                     no submodel '{target_submodel}' with arg '{target_arg}'."
                )
            }
            FitError::LinkCycle { chain } => {
                write!(f, "Link chain forms a cycle: {}", chain.join(" -> "))
            }
            FitError::MissingGuess { ids } => {
                write!(f, "Parameters with id {ids:?} do not have a guess value.")
            }
            FitError::InvalidData { message } => write!(f, "{message}"),
            FitError::SolverFailure { message } => write!(f, "Solver failure: {message}"),
            FitError::Io { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for FitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_names_both_parts() {
        let err = FitError::MissingArgument {
            submodel: "gauss#2".to_string(),
            arg: "sigma".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gauss#2"));
        assert!(msg.contains("sigma"));
    }

    #[test]
    fn link_cycle_lists_chain_in_order() {
        let err = FitError::LinkCycle {
            chain: vec!["a.w".to_string(), "b.w".to_string(), "a.w".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Link chain forms a cycle: a.w -> b.w -> a.w"
        );
    }
}
