//! Discord event handler for serenity.

use std::sync::Arc;

use {
    serenity::{
        all::{Context, EventHandler, GatewayIntents, Message, Ready},
        async_trait,
    },
    tracing::{debug, info, warn},
};

use bloom_extensions::{
    CommandInvocation, CommandRouter, CommandScope, ExtensionHost, InboundMessage, LifecycleOps,
    router::parse_command,
};

/// Handler for Discord gateway events.
pub struct BloomHandler {
    pub host: Arc<ExtensionHost>,
    pub router: Arc<CommandRouter>,
    pub lifecycle: Arc<dyn LifecycleOps>,
    pub prefixes: Vec<String>,
}

impl BloomHandler {
    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }
}

/// Guild-admin check for the command surface: the member's administrator
/// permission when the gateway delivered it, otherwise guild ownership.
async fn is_guild_admin(ctx: &Context, msg: &Message) -> bool {
    if let Some(member) = &msg.member
        && let Some(permissions) = member.permissions
    {
        return permissions.administrator();
    }

    let Some(guild_id) = msg.guild_id else {
        return false;
    };
    match guild_id.to_partial_guild(&ctx.http).await {
        Ok(guild) => guild.owner_id == msg.author.id,
        Err(e) => {
            debug!(error = %e, "failed to fetch guild for admin check");
            false
        },
    }
}

#[async_trait]
impl EventHandler for BloomHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord gateway ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Skip bot messages to prevent loops
        if msg.author.bot {
            return;
        }

        let inbound = InboundMessage {
            guild_id: msg.guild_id.map(|g| g.get()),
            channel_id: msg.channel_id.get(),
            author_id: msg.author.id.get(),
            author_name: msg.author.name.clone(),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
        };

        self.host.broadcast_message(&inbound).await;

        let Some((command, args)) = parse_command(&msg.content, &self.prefixes) else {
            return;
        };
        let Some(scope) = self.router.scope_of(&command).await else {
            return;
        };

        // The guild fetch is only worth it when the scope can use it.
        let user_is_admin = inbound.guild_id.is_some()
            && scope == CommandScope::Admin
            && is_guild_admin(&ctx, &msg).await;

        let invocation = CommandInvocation {
            command,
            args,
            guild_id: inbound.guild_id,
            channel_id: inbound.channel_id,
            user_id: inbound.author_id,
            user_is_admin,
        };

        if let Some(reply) = self
            .router
            .dispatch(&invocation, self.lifecycle.as_ref())
            .await
            && let Err(e) = msg.reply(&ctx.http, &reply).await
        {
            warn!(error = %e, "failed to send command reply");
        }
    }
}
