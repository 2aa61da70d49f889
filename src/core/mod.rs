//! Core vocabulary: constants, errors, shared types, collaborator traits.
//!
//! Everything here is I/O-free and shared by the probe, transport and
//! control layers.

pub mod constants;
mod error;
mod traits;
mod types;

pub use error::*;
pub use traits::*;
pub use types::*;

pub(crate) use types::StateCell;
