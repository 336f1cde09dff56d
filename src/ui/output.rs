//! ui::output
//!
//! Plain-text formatting for informational commands.

use std::fmt::Display;

/// Format `key: value` lines with the values aligned.
pub fn format_fields<V: Display>(fields: &[(&str, V)]) -> String {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    fields
        .iter()
        .map(|(key, value)| format!("{:<width$}  {}", format!("{}:", key), value, width = width + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
