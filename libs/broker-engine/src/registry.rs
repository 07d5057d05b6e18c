use std::collections::HashSet;

use tokio::sync::RwLock;

use sheets_api::{BrokerError, BrokerGateway, TopicSpec};

// ═══════════════════════════════════════════════════════════════
//  TopicRegistration
// ═══════════════════════════════════════════════════════════════

/// Локальный кэш topic'ов, существование которых подтверждено.
///
/// Только растёт; сбрасывается лишь рестартом процесса.
#[derive(Default)]
pub struct TopicRegistration {
    known: RwLock<HashSet<String>>,
}

impl TopicRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.known.read().await.contains(topic)
    }

    /// Запомнить topic. Возвращает `true`, если он был новым.
    pub async fn insert(&self, topic: &str) -> bool {
        self.known.write().await.insert(topic.to_string())
    }

    pub async fn len(&self) -> usize {
        self.known.read().await.len()
    }
}

/// Гарантировать существование topic'а перед publish:
/// registration → metadata → create. `TopicAlreadyExists` — успех.
pub async fn ensure_topic<G>(
    gateway: &G,
    registration: &TopicRegistration,
    spec: &TopicSpec,
) -> Result<(), BrokerError>
where
    G: BrokerGateway + ?Sized,
{
    if registration.contains(&spec.name).await {
        return Ok(());
    }

    if !gateway.topic_exists(&spec.name).await? {
        match gateway.create_topic(spec).await {
            Ok(()) => {
                tracing::info!(topic = %spec.name, partitions = spec.partitions, "topic created");
            }
            Err(BrokerError::TopicAlreadyExists(_)) => {
                tracing::debug!(topic = %spec.name, "topic created concurrently");
            }
            Err(e) => return Err(e),
        }
    }

    registration.insert(&spec.name).await;
    Ok(())
}
