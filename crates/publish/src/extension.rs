//! Auto-relay dispatcher and the key/channel management commands.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::json,
    tokio::sync::RwLock,
    tracing::{debug, warn},
};

use {
    bloom_extensions::{
        CommandContext, CommandInvocation, CommandScope, CommandSpec, Error, Extension,
        ExtensionContext, InboundMessage, Result, SettingsMap,
    },
    bloom_store::SqliteStore,
};

use crate::sink::PublishSink;

pub const EXTENSION_ID: &str = "publish";

const MANAGE_GUILDS_USAGE: &str =
    "Usage: manage-guilds {list|set|user|clear} <guildId> [sourceKey] [userId]";

#[derive(Debug, Clone)]
struct PublishSettings {
    publish_url: String,
}

/// Relays qualifying guild messages to the external publishing endpoint.
pub struct PublishExtension {
    store: Arc<SqliteStore>,
    sink: Arc<dyn PublishSink>,
    settings: RwLock<Option<PublishSettings>>,
}

impl PublishExtension {
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, sink: Arc<dyn PublishSink>) -> Self {
        Self {
            store,
            sink,
            settings: RwLock::new(None),
        }
    }

    async fn publish_url(&self) -> Result<String> {
        self.settings
            .read()
            .await
            .as_ref()
            .map(|s| s.publish_url.clone())
            .ok_or_else(|| Error::missing_setting(EXTENSION_ID, "publish_url"))
    }

    async fn manage_auto_publishing(&self, inv: &CommandInvocation) -> Result<String> {
        let guild_id = inv.require_guild()?;
        match inv.arg(0) {
            Some("set") => {
                let raw = inv.arg(1).ok_or_else(|| {
                    Error::usage("Please specify a channel to set for auto-publishing.")
                })?;
                let channel_id = parse_channel_ref(raw)?;
                self.store
                    .set_publishing_channel(guild_id, channel_id)
                    .await
                    .map_err(store_err)?;
                Ok(format!("Auto-publishing channel set to <#{channel_id}>."))
            },
            Some("reset") => {
                self.store
                    .delete_publishing_channel(guild_id)
                    .await
                    .map_err(store_err)?;
                Ok("Auto-publishing channel reset.".into())
            },
            _ => Err(Error::usage("Invalid choice. Use set or reset.")),
        }
    }

    async fn manage_guilds(&self, inv: &CommandInvocation) -> Result<String> {
        let action = inv.arg(0).ok_or_else(|| Error::usage(MANAGE_GUILDS_USAGE))?;
        let raw_guild = inv.arg(1).ok_or_else(|| Error::usage(MANAGE_GUILDS_USAGE))?;
        // -1 is the "every guild" sentinel for list.
        let guild_ref: i64 = raw_guild
            .parse()
            .map_err(|_| Error::invalid_identifier(raw_guild))?;

        match action {
            "list" => {
                let filter = match guild_ref {
                    -1 => None,
                    id if id >= 0 => Some(id as u64),
                    _ => return Err(Error::invalid_identifier(raw_guild)),
                };
                let keys = self.store.list_source_keys(filter).await.map_err(store_err)?;
                Ok(format!("Source keys: {}", keys.join(", ")))
            },
            "set" => {
                let guild_id = guild_id_from(guild_ref, raw_guild)?;
                let key = inv
                    .arg(2)
                    .ok_or_else(|| Error::usage("Please provide a source key to set."))?;
                self.store
                    .set_source_key(guild_id, key, None)
                    .await
                    .map_err(store_err)?;
                Ok(format!("Added source key {key} for guild {guild_id}."))
            },
            "user" => {
                let guild_id = guild_id_from(guild_ref, raw_guild)?;
                let (Some(key), Some(user_id)) = (inv.arg(2), inv.id_arg(3)?) else {
                    return Err(Error::usage(
                        "Please provide a source key and user ID to set.",
                    ));
                };
                self.store
                    .set_source_key(guild_id, key, Some(user_id))
                    .await
                    .map_err(store_err)?;
                Ok(format!(
                    "Added source key {key} for guild {guild_id} and user {user_id}."
                ))
            },
            "clear" => {
                let guild_id = guild_id_from(guild_ref, raw_guild)?;
                let user_id = inv.id_arg(3)?;
                self.store
                    .clear_source_key(guild_id, user_id)
                    .await
                    .map_err(store_err)?;
                Ok(match user_id {
                    Some(user_id) => {
                        format!("Cleared source key for user {user_id} in guild {guild_id}.")
                    },
                    None => format!("Cleared source key for guild {guild_id}."),
                })
            },
            _ => Err(Error::usage("Invalid action. Use list, set, user or clear.")),
        }
    }
}

#[async_trait]
impl Extension for PublishExtension {
    fn id(&self) -> &str {
        EXTENSION_ID
    }

    fn name(&self) -> &str {
        "Publish"
    }

    fn default_settings(&self) -> SettingsMap {
        let mut defaults = SettingsMap::new();
        defaults.insert("publish_url".into(), json!("https://example.com/publish"));
        defaults
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec {
                name: "manage-auto-publishing",
                scope: CommandScope::Admin,
                description: "Configure this server's auto-publishing channel.",
            },
            CommandSpec {
                name: "manage-guilds",
                scope: CommandScope::Owner,
                description: "Manage source keys across guilds.",
            },
        ]
    }

    async fn on_load(&self, ctx: ExtensionContext) -> Result<()> {
        let publish_url = ctx.settings.str("publish_url")?.to_string();
        *self.settings.write().await = Some(PublishSettings { publish_url });
        Ok(())
    }

    async fn on_unload(&self) -> Result<()> {
        *self.settings.write().await = None;
        Ok(())
    }

    async fn on_message(&self, message: &InboundMessage) -> Result<()> {
        let Some(guild_id) = message.guild_id else {
            return Ok(());
        };

        let channel = self
            .store
            .publishing_channel(guild_id)
            .await
            .map_err(store_err)?;
        if channel != Some(message.channel_id) {
            return Ok(());
        }

        let source_key = self
            .store
            .source_key(Some(message.author_id), Some(guild_id))
            .await
            .map_err(store_err)?;

        let url = self.publish_url().await?;
        debug!(guild_id, channel_id = message.channel_id, "forwarding message");
        if let Err(e) = self
            .sink
            .publish(&url, &message.content, source_key.as_deref())
            .await
        {
            // Fire-and-forget: the failed forward is logged and dropped.
            warn!(guild_id, error = %e, "publish failed");
        }
        Ok(())
    }

    async fn handle_command(&self, ctx: CommandContext<'_>) -> Result<String> {
        match ctx.invocation.command.as_str() {
            "manage-auto-publishing" => self.manage_auto_publishing(ctx.invocation).await,
            "manage-guilds" => self.manage_guilds(ctx.invocation).await,
            other => Err(Error::usage(format!("Unknown command `{other}`."))),
        }
    }
}

fn store_err(e: bloom_store::Error) -> Error {
    Error::external("store query failed", e)
}

fn guild_id_from(guild_ref: i64, raw: &str) -> Result<u64> {
    u64::try_from(guild_ref).map_err(|_| Error::invalid_identifier(raw))
}

/// Accepts a raw channel id or a `<#id>` mention.
fn parse_channel_ref(raw: &str) -> Result<u64> {
    let inner = raw
        .strip_prefix("<#")
        .and_then(|r| r.strip_suffix('>'))
        .unwrap_or(raw);
    inner
        .parse::<u64>()
        .map_err(|_| Error::invalid_identifier(raw))
}
