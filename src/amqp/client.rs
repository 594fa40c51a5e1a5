//! AMQP connection handling.
//!
//! One connection, one publish channel. The topic exchange is declared on
//! connect (idempotent, shared with the real robot and the controller).
//! Publishes use persistent delivery and serialize on the channel through
//! an async mutex, so concurrent simulators cannot interleave frames.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::AmqpConfig;

use super::publisher::WirePublisher;

/// Connected AMQP bus: the shared topic exchange plus a serialized publish
/// channel.
pub struct AmqpBus {
    connection: Connection,
    publish_channel: Mutex<Channel>,
    exchange: String,
}

impl AmqpBus {
    /// Connect to the broker and declare the topic exchange.
    pub async fn connect(config: &AmqpConfig) -> Result<Self> {
        let uri = format!("{}?heartbeat={}", config.uri(), config.heartbeat_seconds);
        info!(host = %config.host, port = config.port, "connecting to AMQP broker");

        let connect = Connection::connect(&uri, ConnectionProperties::default());
        let connection = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_seconds),
            connect,
        )
        .await
        .context("AMQP connection timed out")?
        .context("failed to connect to AMQP broker")?;

        let channel = connection
            .create_channel()
            .await
            .context("failed to open publish channel")?;

        declare_exchange(&channel, &config.exchange).await?;
        info!(exchange = %config.exchange, "AMQP bus ready");

        Ok(Self {
            connection,
            publish_channel: Mutex::new(channel),
            exchange: config.exchange.clone(),
        })
    }

    /// Declare the durable command queue bound to `{robot_id}.cmd`, apply
    /// the prefetch, and return a consuming channel plus the queue name.
    pub async fn command_channel(&self, robot_id: &str, prefetch: u16) -> Result<(Channel, String)> {
        let channel = self
            .connection
            .create_channel()
            .await
            .context("failed to open consume channel")?;

        declare_exchange(&channel, &self.exchange).await?;

        let queue_name = format!("{}.cmd", robot_id);
        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to declare queue '{}'", queue_name))?;

        channel
            .queue_bind(
                &queue_name,
                &self.exchange,
                &queue_name,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to bind queue '{}'", queue_name))?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .context("failed to set prefetch")?;

        info!(
            queue = %queue_name,
            exchange = %self.exchange,
            prefetch,
            "command queue bound"
        );
        Ok((channel, queue_name))
    }

    pub async fn close(&self) -> Result<()> {
        self.connection
            .close(200, "shutdown")
            .await
            .context("failed to close AMQP connection")
    }
}

async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<()> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("failed to declare exchange '{}'", exchange))
}

#[async_trait]
impl WirePublisher for AmqpBus {
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<()> {
        let channel = self.publish_channel.lock().await;
        channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .with_context(|| format!("failed to publish to '{}'", routing_key))?
            .await
            .context("publish confirmation failed")?;
        Ok(())
    }
}
