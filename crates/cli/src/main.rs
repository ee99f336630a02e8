use std::sync::Arc;

use {
    clap::Parser,
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    bloom_config::BotConfig,
    bloom_development::DevelopmentExtension,
    bloom_discord::BloomHandler,
    bloom_extensions::{CommandRouter, ExtensionHost, LifecycleOps},
    bloom_publish::{HttpSink, PublishExtension},
    bloom_store::SqliteStore,
    bloom_utils::UtilsExtension,
};

#[derive(Parser)]
#[command(name = "bloom", about = "bloom — guild-to-endpoint relay bot")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Lifecycle handle injected into command handlers.
struct BotLifecycle {
    host: Arc<ExtensionHost>,
    router: Arc<CommandRouter>,
    shutdown: CancellationToken,
}

#[async_trait::async_trait]
impl LifecycleOps for BotLifecycle {
    async fn reload_extension(&self, extension_id: &str) -> bloom_extensions::Result<()> {
        let result = self.host.reload(extension_id).await;
        // Re-sync the command table either way; a failed reload dropped the
        // extension's commands with it.
        self.router.refresh().await;
        result
    }

    fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// First signal starts the graceful close exactly once; a second signal
/// exits immediately.
fn spawn_signal_latch(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("termination signal received, closing gracefully");
        shutdown.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("second termination signal, exiting immediately");
            std::process::exit(130);
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = BotConfig::from_env()?;
    info!(version = bloom_config::VERSION, "starting bloom");
    if let Some(guild_id) = config.testing_guild_id {
        info!(guild_id, "staging guild configured");
    }

    let store = Arc::new(SqliteStore::new(&config.database_url).await?);

    let mut host = ExtensionHost::new(
        config.extension_settings.clone(),
        config.timezone,
        bloom_config::VERSION,
    );
    for id in &config.enabled_extensions {
        match id.as_str() {
            "utils" => host.register(Arc::new(UtilsExtension::new())),
            "publish" => host.register(Arc::new(PublishExtension::new(
                Arc::clone(&store),
                Arc::new(HttpSink::new()),
            ))),
            "development" => host.register(Arc::new(DevelopmentExtension::new())),
            other => warn!(extension_id = other, "unknown extension enabled, skipping"),
        }
    }
    let host = Arc::new(host);
    host.load_all().await;

    let router = Arc::new(CommandRouter::new(Arc::clone(&host), config.owner_id));
    router.refresh().await;

    let shutdown = CancellationToken::new();
    spawn_signal_latch(shutdown.clone());

    let lifecycle: Arc<dyn LifecycleOps> = Arc::new(BotLifecycle {
        host: Arc::clone(&host),
        router: Arc::clone(&router),
        shutdown: shutdown.clone(),
    });

    let handler = BloomHandler {
        host: Arc::clone(&host),
        router,
        lifecycle,
        prefixes: config.prefixes.clone(),
    };

    bloom_discord::run(config.token.expose_secret(), handler, shutdown).await?;

    host.unload_all().await;
    info!("shutdown complete");
    Ok(())
}
