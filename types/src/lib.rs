//! Core domain types for Atlas.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
mod inference;
mod schedule;
mod theory;

pub use ids::{ITEM_EXTENSION, ItemId, ItemNameError, SCRATCH_PREFIX};
pub use inference::InferenceState;
pub use schedule::region_sizes;
pub use theory::{Theory, TheoryError};
