// AMQP wire adapters: connection, typed publishers, the command consumer
// loop, and the heartbeat loop.

mod client;
mod consumer;
mod heartbeat;
mod publisher;

pub use client::AmqpBus;
pub use consumer::run_consumer;
pub use heartbeat::run_heartbeat;
pub use publisher::{HeartbeatPublisher, LogPublisher, ResultPublisher, WirePublisher};
