//! In-memory sheet with optional JSON persistence.
//!
//! The JSON format is simply the row-major cell grid (header row included),
//! which keeps saved parameter tables diffable and hand-editable.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::FitError;
use crate::sheet::store::{Cell, TabularStore};

/// Row-major in-memory grid implementing [`TabularStore`].
///
/// Row 1 is the header row. The grid grows on out-of-range writes and
/// returns [`Cell::Empty`] for out-of-range reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<Cell>>,
    path: Option<PathBuf>,
}

impl Sheet {
    /// New sheet with the given header row and no data rows.
    pub fn new(header: &[&str]) -> Self {
        Sheet {
            rows: vec![header.iter().map(|s| Cell::from(*s)).collect()],
            path: None,
        }
    }

    /// Append a data row; short rows are padded with empty cells on access.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Bind the sheet to a JSON file path used by [`TabularStore::save`].
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Load a sheet from a JSON file written by [`Sheet::save_as`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FitError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| FitError::Io {
            message: format!("Failed to open sheet '{}': {e}", path.display()),
        })?;
        let rows: Vec<Vec<Cell>> = serde_json::from_reader(file).map_err(|e| FitError::Io {
            message: format!("Invalid sheet JSON '{}': {e}", path.display()),
        })?;
        if rows.is_empty() {
            return Err(FitError::Io {
                message: format!("Sheet '{}' has no header row.", path.display()),
            });
        }
        Ok(Sheet {
            rows,
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the sheet to `path` and bind to it for later saves.
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> Result<(), FitError> {
        self.path = Some(path.into());
        self.write_bound()
    }

    fn write_bound(&self) -> Result<(), FitError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = File::create(path).map_err(|e| FitError::Io {
            message: format!("Failed to create sheet '{}': {e}", path.display()),
        })?;
        serde_json::to_writer_pretty(file, &self.rows).map_err(|e| FitError::Io {
            message: format!("Failed to write sheet '{}': {e}", path.display()),
        })
    }

    fn cell(&self, row: usize, col: usize) -> Cell {
        if row == 0 || col == 0 {
            return Cell::Empty;
        }
        self.rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .cloned()
            .unwrap_or(Cell::Empty)
    }
}

impl TabularStore for Sheet {
    fn get_row_values(&self, row: usize, col_stop: usize) -> Vec<Cell> {
        (1..=col_stop).map(|col| self.cell(row, col)).collect()
    }

    fn get_col_values(&self, col: usize) -> Vec<Cell> {
        (1..=self.get_last_row())
            .map(|row| self.cell(row, col))
            .collect()
    }

    fn set_cell_value(&mut self, value: Cell, row: usize, col: usize) {
        if row == 0 || col == 0 {
            return;
        }
        if self.rows.len() < row {
            self.rows.resize(row, Vec::new());
        }
        let r = &mut self.rows[row - 1];
        if r.len() < col {
            r.resize(col, Cell::Empty);
        }
        r[col - 1] = value;
    }

    fn set_col_values(&mut self, data: &[Cell], col: usize, row_start: usize) {
        for (i, value) in data.iter().enumerate() {
            self.set_cell_value(value.clone(), row_start + i, col);
        }
    }

    fn get_last_row(&self) -> usize {
        self.rows.len()
    }

    fn save(&mut self) -> Result<(), FitError> {
        self.write_bound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_sheet() -> Sheet {
        let mut sheet = Sheet::new(&["a", "b"]);
        sheet.push_row(vec![Cell::Number(1.0), Cell::from("x")]);
        sheet.push_row(vec![Cell::Number(2.0)]);
        sheet
    }

    #[test]
    fn reads_are_padded_and_one_based() {
        let sheet = small_sheet();
        assert_eq!(sheet.get_last_row(), 3);
        assert_eq!(
            sheet.get_row_values(3, 3),
            vec![Cell::Number(2.0), Cell::Empty, Cell::Empty]
        );
        assert_eq!(
            sheet.get_col_values(2),
            vec![Cell::from("b"), Cell::from("x"), Cell::Empty]
        );
    }

    #[test]
    fn writes_grow_the_grid() {
        let mut sheet = small_sheet();
        sheet.set_cell_value(Cell::Number(9.0), 5, 4);
        assert_eq!(sheet.get_last_row(), 5);
        assert_eq!(sheet.get_row_values(5, 4)[3], Cell::Number(9.0));

        sheet.set_col_values(&[Cell::from("p0"), Cell::from("p1")], 2, 2);
        assert_eq!(sheet.get_row_values(2, 2)[1], Cell::from("p0"));
        assert_eq!(sheet.get_row_values(3, 2)[1], Cell::from("p1"));
    }

    #[test]
    fn json_roundtrip_preserves_cells() {
        let dir = std::env::temp_dir().join("sheetfit_grid_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.json");

        let mut sheet = small_sheet();
        sheet.save_as(&path).unwrap();

        let loaded = Sheet::open(&path).unwrap();
        assert_eq!(loaded.get_last_row(), 3);
        assert_eq!(loaded.get_row_values(2, 2), sheet.get_row_values(2, 2));

        std::fs::remove_file(&path).ok();
    }
}
