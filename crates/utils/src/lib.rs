//! Utility extension: `ping` with uptime and version reporting.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    serde_json::json,
    tokio::sync::RwLock,
};

use bloom_extensions::{
    CommandContext, CommandScope, CommandSpec, Error, Extension, ExtensionContext, Result,
    SettingsMap,
};

pub const EXTENSION_ID: &str = "utils";

#[derive(Debug, Clone)]
struct UtilsState {
    pong_message: String,
    loaded_at: DateTime<Tz>,
    timezone: Tz,
    version: String,
}

/// Small quality-of-life commands.
#[derive(Default)]
pub struct UtilsExtension {
    state: RwLock<Option<UtilsState>>,
}

impl UtilsExtension {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Extension for UtilsExtension {
    fn id(&self) -> &str {
        EXTENSION_ID
    }

    fn name(&self) -> &str {
        "Utils"
    }

    fn default_settings(&self) -> SettingsMap {
        let mut defaults = SettingsMap::new();
        defaults.insert("pong_message".into(), json!("pong"));
        defaults
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            name: "ping",
            scope: CommandScope::Everyone,
            description: "Bot uptime and version.",
        }]
    }

    async fn on_load(&self, ctx: ExtensionContext) -> Result<()> {
        let pong_message = ctx.settings.str("pong_message")?.to_string();
        *self.state.write().await = Some(UtilsState {
            pong_message,
            loaded_at: ctx.loaded_at,
            timezone: ctx.timezone,
            version: ctx.version,
        });
        Ok(())
    }

    async fn on_unload(&self) -> Result<()> {
        *self.state.write().await = None;
        Ok(())
    }

    async fn handle_command(&self, _ctx: CommandContext<'_>) -> Result<String> {
        let state = self
            .state
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::missing_setting(EXTENSION_ID, "pong_message"))?;

        let uptime = Utc::now().with_timezone(&state.timezone) - state.loaded_at;
        Ok(format!(
            "{}\nbot has been up for {} seconds\nrunning on version {}.",
            state.pong_message,
            uptime.num_seconds().max(0),
            state.version
        ))
    }
}
