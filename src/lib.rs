//! berth - run and manage OCI containers locally or on a remote service
//!
//! berth is a single-binary container CLI. Every command runs inside a
//! lifecycle that prepares the image and container engines, runs the
//! command body, and tears the engines down again on every exit path.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, dispatches commands)
//! - [`engine`] - Engine collaborators and the pre-run / post-run lifecycle
//! - [`core`] - Configuration, destination resolution and process-wide state
//! - [`ui`] - Error rendering and output formatting
//!
//! # Correctness Invariants
//!
//! 1. Help and completion commands never construct an engine
//! 2. Post-run cleanup runs after success, error, pre-run failure and panic
//! 3. Each engine is shut down at most once, image engine first
//! 4. Invalid user input is rejected before any engine is created

pub mod cli;
pub mod core;
pub mod engine;
pub mod ui;
