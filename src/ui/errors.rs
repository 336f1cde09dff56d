//! ui::errors
//!
//! Rendering of errors that reach the top of the CLI.
//!
//! # Design
//!
//! Every user-visible failure becomes a single `Error: ` line. Failures of
//! the OCI runtime carry the [`OciRuntimeError`] sentinel at the bottom of
//! their chain; for those the sentinel text is moved to the front so the
//! message reads `Error: OCI runtime error: <detail>` rather than ending in
//! the sentinel.

use crate::engine::{EngineError, OciRuntimeError};

const OCI_SUFFIX: &str = ": OCI runtime error";

/// Format `err` for display.
///
/// `verbose` prints the full cause chain with `{:?}`; otherwise the chain is
/// joined with `": "`.
pub fn format_error(err: &anyhow::Error, verbose: bool) -> String {
    if err.chain().any(|cause| cause.is::<OciRuntimeError>()) {
        let text = format!("{:#}", err);
        let detail = text.strip_suffix(OCI_SUFFIX).unwrap_or(&text);
        return format!("Error: OCI runtime error: {}", detail);
    }

    if verbose {
        format!("Error: {:?}", err)
    } else {
        format!("Error: {:#}", err)
    }
}

/// Hint printed after a remote connection failure.
pub fn connection_hint(err: &anyhow::Error) -> Option<&'static str> {
    let refused = err.chain().any(|cause| {
        cause
            .downcast_ref::<EngineError>()
            .is_some_and(EngineError::is_connection)
    });
    refused.then_some(
        "Cannot connect to the berth service. Check the destination given by --url, \
         --connection or CONTAINER_HOST, and that the service is running.",
    )
}
