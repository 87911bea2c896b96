//! # ts-types
//!
//! The backend-visible vocabulary of Tunespace: the three primitive descriptor
//! kinds, the per-trial assignments a backend produces for them, and the
//! error taxonomy shared by every crate in the workspace.

pub mod descriptor;
pub mod errors;

pub use descriptor::*;
pub use errors::*;
