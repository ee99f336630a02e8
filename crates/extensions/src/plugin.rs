//! Extension trait and the context objects handed to it.

use {async_trait::async_trait, chrono::DateTime, chrono_tz::Tz};

use crate::{
    error::{Error, Result},
    settings::{ResolvedSettings, SettingsMap},
};

/// A platform-neutral inbound chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
}

/// Who may invoke a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Everyone,
    /// Guild administrators (the owner always qualifies).
    Admin,
    /// The configured bot operator only.
    Owner,
}

/// A command an extension serves, registered with the router on (re)load.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub scope: CommandScope,
    pub description: &'static str,
}

/// A parsed command invocation from the chat surface.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub command: String,
    pub args: Vec<String>,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub user_id: u64,
    /// Whether the gateway adapter established guild-admin rights for the
    /// author. Meaningless for DMs.
    pub user_is_admin: bool,
}

impl CommandInvocation {
    /// Positional argument by index.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Positional argument parsed as an integer id. Non-integer input is an
    /// [`Error::InvalidIdentifier`]; this runs before anything reaches the
    /// store.
    pub fn id_arg(&self, index: usize) -> Result<Option<u64>> {
        match self.args.get(index) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::invalid_identifier(raw)),
        }
    }

    /// The guild this invocation came from, or a usage error for commands
    /// that only make sense inside a guild.
    pub fn require_guild(&self) -> Result<u64> {
        self.guild_id
            .ok_or_else(|| Error::usage("This command can only be used in a server."))
    }
}

/// Lifecycle operations available to command handlers, injected by the
/// process wiring rather than reached through a global.
#[async_trait]
pub trait LifecycleOps: Send + Sync {
    /// Reload an extension and re-sync command registration.
    async fn reload_extension(&self, extension_id: &str) -> Result<()>;

    /// Begin the graceful shutdown sequence. Idempotent; calling it twice
    /// has no additional effect.
    fn begin_shutdown(&self);
}

/// Context handed to a command handler.
pub struct CommandContext<'a> {
    pub invocation: &'a CommandInvocation,
    pub lifecycle: &'a dyn LifecycleOps,
}

/// Context handed to an extension when it is (re)loaded.
#[derive(Debug, Clone)]
pub struct ExtensionContext {
    /// Freshly merged, type-checked settings.
    pub settings: ResolvedSettings,
    /// Load timestamp in the process timezone; the basis for uptime
    /// reporting.
    pub loaded_at: DateTime<Tz>,
    pub timezone: Tz,
    pub version: String,
}

/// Core extension trait. Each feature module implements this.
///
/// Handlers take `&self`; extensions keep mutable state (typically their
/// typed settings struct) behind their own lock so a reload can swap it
/// while events are in flight.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Extension identifier (e.g. "publish").
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Settings this extension declares, with their default values.
    fn default_settings(&self) -> SettingsMap {
        SettingsMap::new()
    }

    /// Commands this extension serves.
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Registration hook; runs on every (re)load with freshly merged
    /// settings.
    async fn on_load(&self, ctx: ExtensionContext) -> Result<()>;

    /// Teardown hook; runs before a reload replaces the registration.
    async fn on_unload(&self) -> Result<()> {
        Ok(())
    }

    /// Inbound message hook.
    async fn on_message(&self, _message: &InboundMessage) -> Result<()> {
        Ok(())
    }

    /// Handle a command this extension declared via [`Extension::commands`].
    /// Returns the reply text.
    async fn handle_command(&self, _ctx: CommandContext<'_>) -> Result<String> {
        Err(Error::usage("This extension serves no commands."))
    }
}
