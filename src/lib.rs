//! `sheetfit` library crate.
//!
//! A spreadsheet-driven composite curve fitter:
//!
//! - a parameter table (one row per submodel argument use-case) lives in a
//!   [`sheet::TabularStore`]
//! - [`table`] reads it into a typed parameter table
//! - [`assemble`] resolves fixed/free/linked parameters into a
//!   [`assemble::CompositeModel`] with stable `p<N>`/`x<M>` identifiers
//! - [`fit`] drives a bounded least-squares fit and writes fitted values
//!   and standard errors back into the store
//!
//! The crate is a library on purpose: hosts own the store and the submodel
//! registry and call into the fit driver.

pub mod assemble;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod sheet;
pub mod table;
