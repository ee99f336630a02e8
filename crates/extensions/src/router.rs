//! Prefix command routing: scope enforcement, dispatch, error translation.
//!
//! The routing table is rebuilt from the loaded extensions after every
//! lifecycle change; that rebuild is the command-registration re-sync.

use std::{collections::HashMap, sync::Arc};

use {
    tokio::sync::RwLock,
    tracing::{debug, error, warn},
};

use crate::{
    host::ExtensionHost,
    plugin::{CommandContext, CommandInvocation, CommandScope, LifecycleOps},
};

#[derive(Clone)]
struct Route {
    extension_id: String,
    scope: CommandScope,
}

/// Routes parsed command invocations to the extension that declared them.
pub struct CommandRouter {
    host: Arc<ExtensionHost>,
    owner_id: Option<u64>,
    table: RwLock<HashMap<String, Route>>,
}

impl CommandRouter {
    #[must_use]
    pub fn new(host: Arc<ExtensionHost>, owner_id: Option<u64>) -> Self {
        Self {
            host,
            owner_id,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the routing table from the currently loaded extensions.
    pub async fn refresh(&self) {
        let mut table = HashMap::new();
        for (extension_id, spec) in self.host.command_specs().await {
            let previous = table.insert(
                spec.name.to_string(),
                Route {
                    extension_id,
                    scope: spec.scope,
                },
            );
            if previous.is_some() {
                warn!(command = spec.name, "duplicate command registration, keeping the last");
            }
        }
        debug!(commands = table.len(), "command table synced");
        *self.table.write().await = table;
    }

    /// Scope of a registered command, if any. Gateway adapters use this to
    /// decide whether an admin check is worth computing before dispatch.
    pub async fn scope_of(&self, command: &str) -> Option<CommandScope> {
        self.table.read().await.get(command).map(|r| r.scope)
    }

    fn is_owner(&self, user_id: u64) -> bool {
        self.owner_id == Some(user_id)
    }

    fn authorized(&self, scope: CommandScope, invocation: &CommandInvocation) -> bool {
        match scope {
            CommandScope::Everyone => true,
            CommandScope::Admin => invocation.user_is_admin || self.is_owner(invocation.user_id),
            CommandScope::Owner => self.is_owner(invocation.user_id),
        }
    }

    /// Dispatch a parsed invocation. Returns `None` for commands nobody
    /// registered (the message is ignored), otherwise the reply text.
    ///
    /// Expected failures (bad identifiers, permission, usage) become the
    /// reply; anything else is logged with context and answered with a
    /// generic failure so one bad invocation never escapes its event task.
    pub async fn dispatch(
        &self,
        invocation: &CommandInvocation,
        lifecycle: &dyn LifecycleOps,
    ) -> Option<String> {
        let route = self.table.read().await.get(&invocation.command).cloned()?;

        if !self.authorized(route.scope, invocation) {
            warn!(
                command = %invocation.command,
                user_id = invocation.user_id,
                "unauthorized command invocation"
            );
            return Some("You are not allowed to use this command.".into());
        }

        if !self.host.is_loaded(&route.extension_id).await {
            return Some("That command is currently unavailable.".into());
        }
        let ext = self.host.extension(&route.extension_id)?;

        let ctx = CommandContext {
            invocation,
            lifecycle,
        };
        match ext.handle_command(ctx).await {
            Ok(reply) => Some(reply),
            Err(e) if e.is_user_facing() => Some(e.to_string()),
            Err(e) => {
                error!(
                    command = %invocation.command,
                    extension_id = %route.extension_id,
                    error = %e,
                    "command handler failed"
                );
                Some("Something went wrong while running that command.".into())
            },
        }
    }
}

/// Split a raw message into a command name and args when it starts with one
/// of the configured prefixes.
#[must_use]
pub fn parse_command(content: &str, prefixes: &[String]) -> Option<(String, Vec<String>)> {
    let trimmed = content.trim();
    let rest = prefixes
        .iter()
        .find_map(|p| trimmed.strip_prefix(p.as_str()))?;
    let mut parts = rest.split_whitespace();
    let name = parts.next()?.to_string();
    Some((name, parts.map(str::to_string).collect()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use {
        super::*,
        crate::{
            error::Result,
            plugin::{CommandSpec, Extension, ExtensionContext},
            settings::ExtensionOverrides,
        },
    };

    struct NoopLifecycle;

    #[async_trait]
    impl LifecycleOps for NoopLifecycle {
        async fn reload_extension(&self, _extension_id: &str) -> Result<()> {
            Ok(())
        }

        fn begin_shutdown(&self) {}
    }

    struct CommandProbe;

    #[async_trait]
    impl Extension for CommandProbe {
        fn id(&self) -> &str {
            "probe"
        }

        fn name(&self) -> &str {
            "Probe"
        }

        fn commands(&self) -> Vec<CommandSpec> {
            vec![
                CommandSpec {
                    name: "open",
                    scope: CommandScope::Everyone,
                    description: "anyone may run this",
                },
                CommandSpec {
                    name: "guarded",
                    scope: CommandScope::Admin,
                    description: "admins only",
                },
                CommandSpec {
                    name: "restricted",
                    scope: CommandScope::Owner,
                    description: "owner only",
                },
            ]
        }

        async fn on_load(&self, _ctx: ExtensionContext) -> Result<()> {
            Ok(())
        }

        async fn handle_command(&self, ctx: CommandContext<'_>) -> Result<String> {
            match ctx.invocation.command.as_str() {
                "open" => {
                    // Exercise identifier validation on the first arg.
                    let id = ctx.invocation.id_arg(0)?;
                    Ok(format!("ok {id:?}"))
                },
                other => Ok(format!("ran {other}")),
            }
        }
    }

    async fn router() -> CommandRouter {
        let mut host = ExtensionHost::new(
            ExtensionOverrides::new(),
            chrono_tz::America::New_York,
            "test",
        );
        host.register(Arc::new(CommandProbe));
        let host = Arc::new(host);
        host.load_all().await;
        let router = CommandRouter::new(host, Some(42));
        router.refresh().await;
        router
    }

    fn invocation(command: &str, args: &[&str], user_id: u64, is_admin: bool) -> CommandInvocation {
        CommandInvocation {
            command: command.into(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
            guild_id: Some(1),
            channel_id: 2,
            user_id,
            user_is_admin: is_admin,
        }
    }

    #[tokio::test]
    async fn unknown_command_is_ignored() {
        let r = router().await;
        assert!(
            r.dispatch(&invocation("nope", &[], 1, false), &NoopLifecycle)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn owner_command_rejects_non_owner() {
        let r = router().await;
        let reply = r
            .dispatch(&invocation("restricted", &[], 7, true), &NoopLifecycle)
            .await
            .unwrap();
        assert_eq!(reply, "You are not allowed to use this command.");

        let reply = r
            .dispatch(&invocation("restricted", &[], 42, false), &NoopLifecycle)
            .await
            .unwrap();
        assert_eq!(reply, "ran restricted");
    }

    #[tokio::test]
    async fn admin_command_accepts_admin_and_owner() {
        let r = router().await;
        let denied = r
            .dispatch(&invocation("guarded", &[], 7, false), &NoopLifecycle)
            .await
            .unwrap();
        assert_eq!(denied, "You are not allowed to use this command.");

        for inv in [
            invocation("guarded", &[], 7, true),
            invocation("guarded", &[], 42, false),
        ] {
            let reply = r.dispatch(&inv, &NoopLifecycle).await.unwrap();
            assert_eq!(reply, "ran guarded");
        }
    }

    #[tokio::test]
    async fn invalid_identifier_becomes_a_reply() {
        let r = router().await;
        let reply = r
            .dispatch(
                &invocation("open", &["not-a-number"], 1, false),
                &NoopLifecycle,
            )
            .await
            .unwrap();
        assert_eq!(reply, "invalid identifier: `not-a-number`");
    }

    #[tokio::test]
    async fn valid_identifier_passes_through() {
        let r = router().await;
        let reply = r
            .dispatch(&invocation("open", &["123"], 1, false), &NoopLifecycle)
            .await
            .unwrap();
        assert_eq!(reply, "ok Some(123)");
    }

    #[test]
    fn parse_command_strips_prefix_and_splits_args() {
        let prefixes = vec!["=".to_string()];
        assert_eq!(
            parse_command("=manage-guilds set 1 key", &prefixes),
            Some((
                "manage-guilds".into(),
                vec!["set".into(), "1".into(), "key".into()]
            ))
        );
        assert_eq!(parse_command("hello world", &prefixes), None);
        assert_eq!(parse_command("=", &prefixes), None);
        assert_eq!(parse_command("  =ping  ", &prefixes), Some(("ping".into(), vec![])));
    }

    #[tokio::test]
    async fn refresh_drops_commands_of_unloaded_extensions() {
        let mut host = ExtensionHost::new(
            ExtensionOverrides::new(),
            chrono_tz::America::New_York,
            "test",
        );
        host.register(Arc::new(CommandProbe));
        let host = Arc::new(host);
        host.load_all().await;

        let router = CommandRouter::new(Arc::clone(&host), None);
        router.refresh().await;
        assert!(
            router
                .dispatch(&invocation("open", &[], 1, false), &NoopLifecycle)
                .await
                .is_some()
        );

        host.unload("probe").await.unwrap();
        router.refresh().await;
        assert!(
            router
                .dispatch(&invocation("open", &[], 1, false), &NoopLifecycle)
                .await
                .is_none()
        );
    }
}
