//! Cell values, the store trait, and header-column resolution.
//!
//! Addressing convention (spreadsheet-style):
//! - rows and columns are 1-based
//! - row 1 is the header row; data starts at row 2
//!
//! The header row must contain the named columns listed in
//! [`REQUIRED_COLUMNS`]; [`HeaderMap`] resolves them once per operation so
//! the column order in the sheet is free.

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Rightmost column read when scanning a row (column `L` of the original
/// sheet layout). Columns beyond this are ignored.
pub const LAST_COL: usize = 12;

/// Column names the parameter table must provide (in any order).
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "#", "submodel", "arg", "use", "vary", "guess", "min", "max", "fitted", "error", "id",
];

/// A single untyped cell value.
///
/// Spreadsheet cells arrive either as numbers or as text; numeric text
/// (e.g. `"5.0"` typed into a guess cell) coerces through [`Cell::as_number`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Numeric view of the cell, parsing numeric text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Textual view: numbers render with `{}` formatting, empty is `""`.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => format!("{v}"),
            Cell::Text(s) => s.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::from(s.as_str())
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// The grid surface the fitting engine consumes.
///
/// Reads past the populated area return [`Cell::Empty`]; writes past it
/// grow the grid. `save` persists through whatever backend the store is
/// bound to and defaults to a no-op for purely in-memory stores.
pub trait TabularStore {
    /// Values of `row` from column 1 through `col_stop` inclusive.
    fn get_row_values(&self, row: usize, col_stop: usize) -> Vec<Cell>;

    /// All values of `col` from row 1 through the last row.
    fn get_col_values(&self, col: usize) -> Vec<Cell>;

    fn set_cell_value(&mut self, value: Cell, row: usize, col: usize);

    /// Write `data` down `col` starting at `row_start`.
    fn set_col_values(&mut self, data: &[Cell], col: usize, row_start: usize);

    /// Index of the last populated row (1-based); 1 means header only.
    fn get_last_row(&self) -> usize;

    fn save(&mut self) -> Result<(), FitError> {
        Ok(())
    }
}

/// Resolved 1-based column indices of the required named columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMap {
    pub index: usize,
    pub submodel: usize,
    pub arg: usize,
    pub use_: usize,
    pub vary: usize,
    pub guess: usize,
    pub min: usize,
    pub max: usize,
    pub fitted: usize,
    pub error: usize,
    pub id: usize,
}

impl HeaderMap {
    /// Read the header row and locate every required column.
    pub fn read(store: &impl TabularStore) -> Result<Self, FitError> {
        let header = store.get_row_values(1, LAST_COL);
        let find = |name: &str| -> Result<usize, FitError> {
            header
                .iter()
                .position(|c| c.as_text().trim() == name)
                .map(|i| i + 1)
                .ok_or_else(|| FitError::MissingColumn {
                    name: name.to_string(),
                })
        };

        Ok(HeaderMap {
            index: find("#")?,
            submodel: find("submodel")?,
            arg: find("arg")?,
            use_: find("use")?,
            vary: find("vary")?,
            guess: find("guess")?,
            min: find("min")?,
            max: find("max")?,
            fitted: find("fitted")?,
            error: find("error")?,
            id: find("id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::grid::Sheet;

    #[test]
    fn cell_number_coercion() {
        assert_eq!(Cell::Number(2.5).as_number(), Some(2.5));
        assert_eq!(Cell::Text(" 5 ".to_string()).as_number(), Some(5.0));
        assert_eq!(Cell::Text("y".to_string()).as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
    }

    #[test]
    fn blank_text_is_empty() {
        assert!(Cell::from("  ").is_empty());
        assert!(Cell::Empty.is_empty());
        assert!(!Cell::Number(0.0).is_empty());
    }

    #[test]
    fn header_map_resolves_shuffled_columns() {
        let sheet = Sheet::new(&[
            "#", "submodel", "arg", "use", "vary", "guess", "min", "max", "fitted", "error", "id",
        ]);
        let header = HeaderMap::read(&sheet).unwrap();
        assert_eq!(header.index, 1);
        assert_eq!(header.submodel, 2);
        assert_eq!(header.id, 11);
    }

    #[test]
    fn header_map_reports_missing_column() {
        let sheet = Sheet::new(&["#", "submodel", "arg", "use", "vary", "guess"]);
        let err = HeaderMap::read(&sheet).unwrap_err();
        assert_eq!(
            err,
            FitError::MissingColumn {
                name: "min".to_string()
            }
        );
    }
}
