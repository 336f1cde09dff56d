//! system info command - Display information about this invocation

use crate::core::context::InvocationContext;
use crate::core::{parallel, rlimit};
use crate::engine::EngineRegistry;
use crate::ui::output::format_fields;
use anyhow::Result;

/// Collect the `system info` fields.
pub fn info_fields(ctx: &InvocationContext, registry: &EngineRegistry) -> Vec<(&'static str, String)> {
    let mode = if ctx.is_remote() { "remote" } else { "local" };
    let mut fields = vec![
        ("version", env!("CARGO_PKG_VERSION").to_string()),
        ("mode", mode.to_string()),
    ];

    if ctx.is_remote() {
        let service = if ctx.destination.service.is_empty() {
            "(none)".to_string()
        } else {
            ctx.destination.service.clone()
        };
        fields.push(("service", service));
        fields.push(("uri", ctx.destination.uri.clone()));
        if !ctx.destination.identity.is_empty() {
            fields.push(("identity", ctx.destination.identity.clone()));
        }
    } else {
        fields.push(("runtime", ctx.runtime()));
        fields.push(("runroot", ctx.state_root().display().to_string()));
        fields.push(("rootless", ctx.rootless.to_string()));
    }

    let workers = parallel::global()
        .map(|pool| pool.max().to_string())
        .unwrap_or_else(|| "unset".to_string());
    fields.push(("max workers", workers));

    let limits = rlimit::open_file_limits()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unavailable".to_string());
    fields.push(("open files", limits));

    let config = ctx
        .config
        .loaded_from()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());
    fields.push(("config", config));

    if let Some(engine) = registry.image() {
        let info = engine.info();
        fields.push(("image engine", format!("{} {}", info.mode, info.endpoint)));
    }
    if let Some(engine) = registry.container() {
        let info = engine.info();
        fields.push(("container engine", format!("{} {}", info.mode, info.endpoint)));
    }

    fields
}

/// Print `system info`.
pub fn info(ctx: &InvocationContext, registry: &EngineRegistry) -> Result<()> {
    println!("{}", format_fields(&info_fields(ctx, registry)));
    Ok(())
}
