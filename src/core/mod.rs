//! core
//!
//! Configuration, destination resolution and process-wide state.
//!
//! # Modules
//!
//! - [`config`] - Configuration schema and loading
//! - [`context`] - Per-invocation context, global flags and exit state
//! - [`destination`] - Which service endpoint this invocation targets
//! - [`env`] - Environment variable access behind a trait
//! - [`parallel`] - Process-wide worker pool
//! - [`profile`] - CPU profiling
//! - [`rlimit`] - Resource-limit probe
//! - [`syslog`] - Syslog log sink
//!
//! # Design Principles
//!
//! - Nothing here talks to an engine
//! - Schemas are strict and self-describing
//! - Probes that only feed diagnostics never fail

pub mod config;
pub mod context;
pub mod destination;
pub mod env;
pub mod parallel;
pub mod profile;
pub mod rlimit;
#[cfg(unix)]
pub mod syslog;
