//! ui
//!
//! Terminal output.
//!
//! # Modules
//!
//! - [`errors`] - Rendering of top-level errors
//! - [`output`] - Plain-text formatting for informational commands
//!
//! # Design
//!
//! Command results go to stdout; errors and hints go to stderr. Nothing in
//! this module decides exit codes.

pub mod errors;
pub mod output;
