//! Parameter Table Builder.
//!
//! Reads the tabular store into a typed, ordered parameter table:
//! submodel instance → argument → one [`UseCase`] per row occurrence.
//! Repeated (submodel, arg) rows append a use-case rather than overwrite,
//! which models the same physical parameter appearing in multiple active
//! configurations.
//!
//! Ordering matters: submodels, arguments, and use-cases keep the row order
//! of first encounter, and the assembler's identifier assignment leans on
//! that for rebuild stability.

use crate::error::FitError;
use crate::sheet::{Cell, HeaderMap, TabularStore, LAST_COL};

/// One row occurrence of a (submodel, arg) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct UseCase {
    /// 1-based sheet row this case was read from (write-back target).
    pub row: usize,
    pub use_: Cell,
    pub vary: Cell,
    pub guess: Cell,
    pub min: Cell,
    pub max: Cell,
    pub fitted: Cell,
    pub error: Cell,
    pub id: Cell,
}

/// All use-cases of one argument of one submodel instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgEntry {
    pub name: String,
    pub cases: Vec<UseCase>,
}

impl ArgEntry {
    /// Index of the first use-case with `use = y`, the one the assembler
    /// selects.
    pub fn active_case(&self) -> Option<usize> {
        self.cases
            .iter()
            .position(|c| c.use_.as_text().trim() == "y")
    }
}

/// All arguments of one submodel instance, in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmodelParams {
    pub name: String,
    pub args: Vec<ArgEntry>,
}

impl SubmodelParams {
    pub fn arg(&self, name: &str) -> Option<&ArgEntry> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Active iff any argument has `use = y` in any use-case.
    pub fn is_active(&self) -> bool {
        self.args.iter().any(|a| a.active_case().is_some())
    }
}

/// The full parameter table plus the resolved header layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTable {
    pub submodels: Vec<SubmodelParams>,
    pub header: HeaderMap,
}

impl ParameterTable {
    pub fn submodel(&self, name: &str) -> Option<&SubmodelParams> {
        self.submodels.iter().find(|s| s.name == name)
    }
}

/// Scan the store into a [`ParameterTable`].
///
/// Side effect (the only store write in this module): the `#` column of
/// every data row is renumbered with a sequential 0-based display index
/// before scanning.
pub fn read_parameters(store: &mut impl TabularStore) -> Result<ParameterTable, FitError> {
    let header = HeaderMap::read(store)?;
    let last_row = store.get_last_row();

    // Renumber the display index column.
    let indices: Vec<Cell> = (0..last_row.saturating_sub(1))
        .map(|i| Cell::Number(i as f64))
        .collect();
    store.set_col_values(&indices, header.index, 2);

    let mut submodels: Vec<SubmodelParams> = Vec::new();

    for row in 2..=last_row {
        let values = store.get_row_values(row, LAST_COL);
        let cell = |col: usize| values.get(col - 1).cloned().unwrap_or(Cell::Empty);

        let submodel = cell(header.submodel).as_text().trim().to_string();
        if submodel.is_empty() {
            continue;
        }
        let arg = cell(header.arg).as_text().trim().to_string();
        if arg.is_empty() {
            return Err(FitError::InvalidRow {
                row,
                message: format!("submodel '{submodel}' has no arg."),
            });
        }

        let case = UseCase {
            row,
            use_: cell(header.use_),
            vary: cell(header.vary),
            guess: cell(header.guess),
            min: cell(header.min),
            max: cell(header.max),
            fitted: cell(header.fitted),
            error: cell(header.error),
            id: cell(header.id),
        };

        let slot = match submodels.iter().position(|s| s.name == submodel) {
            Some(slot) => slot,
            None => {
                submodels.push(SubmodelParams {
                    name: submodel,
                    args: Vec::new(),
                });
                submodels.len() - 1
            }
        };
        let entry = &mut submodels[slot];

        match entry.args.iter_mut().find(|a| a.name == arg) {
            Some(arg_entry) => arg_entry.cases.push(case),
            None => entry.args.push(ArgEntry {
                name: arg,
                cases: vec![case],
            }),
        }
    }

    Ok(ParameterTable { submodels, header })
}
