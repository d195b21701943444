//! Submodel registry and builtin model functions.
//!
//! A submodel is one named component function summed into the composite
//! model. Registration is explicit: hosts build a [`SubmodelRegistry`]
//! (usually starting from [`default_registry`]) and register their own
//! shapes before assembling a model. There is no lookup-by-eval and no
//! global mutable state; an unknown name fails the build immediately.

pub mod builtin;
pub mod registry;

pub use builtin::*;
pub use registry::*;
