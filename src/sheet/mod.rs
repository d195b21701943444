//! Tabular store: the spreadsheet-shaped home of the parameter table.
//!
//! The fitting engine only ever talks to a [`TabularStore`]; the bundled
//! [`Sheet`] is an in-memory implementation with optional JSON persistence,
//! and hosts backed by a real spreadsheet implement the same trait.

pub mod grid;
pub mod store;

pub use grid::*;
pub use store::*;
