//! Model Assembler.
//!
//! Turns the parameter table into a typed composite model: an ordered list
//! of submodel terms whose arguments are either literals (fixed or
//! link-to-fixed) or references into the free-parameter vector. No model
//! source code is generated or evaluated at runtime.

pub mod builder;
pub mod composite;

pub use builder::*;
pub use composite::*;
