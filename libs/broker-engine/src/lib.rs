//! Реализации BrokerGateway: Kafka (librdkafka) и in-process.

pub mod kafka;
pub mod memory;
pub mod registry;

pub use kafka::{KafkaConfig, KafkaGateway};
pub use memory::MemoryBroker;
pub use registry::{ensure_topic, TopicRegistration};
