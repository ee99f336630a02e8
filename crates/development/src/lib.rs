//! Operator extension: extension reload and graceful shutdown.
//!
//! Enabled by default in development mode only; both commands are owner-only
//! and act through the injected [`LifecycleOps`] handle.

use {
    async_trait::async_trait,
    tracing::{info, warn},
};

use bloom_extensions::{
    CommandContext, CommandScope, CommandSpec, Error, Extension, ExtensionContext, Result,
};

pub const EXTENSION_ID: &str = "development";

#[derive(Default)]
pub struct DevelopmentExtension;

impl DevelopmentExtension {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extension for DevelopmentExtension {
    fn id(&self) -> &str {
        EXTENSION_ID
    }

    fn name(&self) -> &str {
        "Development"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec {
                name: "reload-ext",
                scope: CommandScope::Owner,
                description: "Reload an extension.",
            },
            CommandSpec {
                name: "shutdown",
                scope: CommandScope::Owner,
                description: "Shut the bot down gracefully.",
            },
        ]
    }

    async fn on_load(&self, _ctx: ExtensionContext) -> Result<()> {
        Ok(())
    }

    async fn handle_command(&self, ctx: CommandContext<'_>) -> Result<String> {
        match ctx.invocation.command.as_str() {
            "reload-ext" => {
                let id = ctx
                    .invocation
                    .arg(0)
                    .ok_or_else(|| Error::usage("Please provide an extension id to reload."))?;
                match ctx.lifecycle.reload_extension(id).await {
                    Ok(()) => {
                        info!(extension_id = id, "reloaded extension");
                        Ok(format!("Safely reloaded extension `{id}`."))
                    },
                    Err(e) => {
                        warn!(extension_id = id, error = %e, "extension reload failed");
                        Ok(format!(
                            "There was an error while reloading extension `{id}`: {e}"
                        ))
                    },
                }
            },
            "shutdown" => {
                info!("shutdown requested, closing gracefully");
                ctx.lifecycle.begin_shutdown();
                Ok("Shutting down gracefully...".into())
            },
            other => Err(Error::usage(format!("Unknown command `{other}`."))),
        }
    }
}
