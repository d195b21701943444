//! Fit Driver.
//!
//! Rebuild the composite model from the sheet, run the bounded
//! least-squares solver, and write fitted values and standard errors back
//! into the sheet.

pub mod driver;
pub mod sigma;

pub use driver::*;
pub use sigma::*;
