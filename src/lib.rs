// Configuration
pub mod config;

// Wire protocol: commands, results, entity updates
pub mod protocol;

// In-memory world model and task preconditions
pub mod world;

// Pure factories: entity updates, images, timing
pub mod generators;

// Fault injection
pub mod scenario;

// Per-task simulators
pub mod simulators;

// Command dispatch pipeline
pub mod dispatch;

// AMQP wire adapters and background loops
pub mod amqp;
