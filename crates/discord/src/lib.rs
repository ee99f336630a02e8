//! Discord gateway adapter for bloom.
//!
//! Thin serenity wrapper: converts gateway events into platform-neutral
//! messages for the extension host and relays command replies back. All
//! routing, permission and lifecycle logic lives behind this boundary.

pub mod handler;

pub use handler::BloomHandler;

use {serenity::all::Client, tokio_util::sync::CancellationToken, tracing::info};

/// Run the gateway until cancelled. Cancellation triggers a graceful shard
/// shutdown; a second termination signal is handled upstream as a hard exit.
pub async fn run(
    token: &str,
    handler: BloomHandler,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut client = Client::builder(token, BloomHandler::intents())
        .event_handler(handler)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::select! {
        result = client.start() => {
            result?;
        }
        () = shutdown.cancelled() => {
            info!("closing discord gateway");
            shard_manager.shutdown_all().await;
        }
    }
    Ok(())
}
