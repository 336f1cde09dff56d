//! version command - Display version information

use crate::core::context::InvocationContext;
use crate::engine::EngineRegistry;
use crate::ui::output::format_fields;
use anyhow::Result;

/// Print version information.
pub fn version(ctx: &InvocationContext, registry: &EngineRegistry) -> Result<()> {
    let mut fields = vec![
        ("Version", env!("CARGO_PKG_VERSION").to_string()),
        (
            "OS/Arch",
            format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        ),
    ];
    if ctx.is_remote() {
        fields.push(("Server", ctx.destination.uri.clone()));
    } else if let Some(engine) = registry.container() {
        fields.push(("Runtime", engine.info().endpoint));
    }

    println!("{}", format_fields(&fields));
    Ok(())
}
