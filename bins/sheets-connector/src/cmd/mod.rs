pub mod publish;
pub mod serve;
pub mod topic;

use std::sync::Arc;

use broker_engine::{KafkaGateway, MemoryBroker};
use sheets_api::BrokerGateway;

use crate::config::{BrokerKind, ServerConfig};
use crate::error::ServerError;

/// Broker по `[broker] kind`.
fn build_broker(config: &ServerConfig) -> Result<Arc<dyn BrokerGateway>, ServerError> {
    match (config.broker.kind, &config.broker.kafka) {
        (BrokerKind::Kafka, Some(kafka)) => Ok(Arc::new(KafkaGateway::new(kafka.clone())?)),
        (BrokerKind::Kafka, None) => Err(ServerError::config("broker", "missing [broker.kafka]")),
        (BrokerKind::Memory, _) => {
            tracing::warn!("using in-process broker, messages are not persisted");
            Ok(Arc::new(MemoryBroker::new()))
        }
    }
}
