//! Command consumer loop.
//!
//! Pulls deliveries off the per-robot command queue and feeds them to the
//! dispatch pipeline. The delivery is acknowledged when the pipeline
//! returns; long-running tasks are already detached by then, so they never
//! hold acks against the prefetch window.

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;

/// Consume commands until the shutdown token fires or the broker stream
/// ends. Returns an error only on a broker-level failure.
pub async fn run_consumer(
    channel: Channel,
    queue_name: String,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut consumer = channel
        .basic_consume(
            &queue_name,
            "talos-mock",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("failed to start consuming from '{}'", queue_name))?;

    info!(queue = %queue_name, "consuming commands");

    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("consumer shutting down");
                break;
            }
            delivery = consumer.next() => delivery,
        };

        let delivery = match delivery {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                error!(error = %e, "error receiving delivery");
                continue;
            }
            None => {
                warn!("command stream ended");
                break;
            }
        };

        // The pipeline never panics the loop; every outcome (including
        // malformed bodies) is handled inside.
        dispatcher.handle_command(&delivery.data).await;

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!(error = %e, "failed to acknowledge delivery");
        }
    }

    Ok(())
}
