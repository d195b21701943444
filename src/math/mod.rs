//! Mathematical utilities: the bounded least-squares solver and small
//! numeric helpers.

pub mod lm;
pub mod util;

pub use lm::*;
pub use util::*;
