use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::BrokerError;

/// Таймаут запроса metadata broker'а.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
/// Таймаут ожидания одного сообщения в consume-цикле.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

// ════════════════════════════════════════════════════════════════
//  Topic provisioning
// ════════════════════════════════════════════════════════════════

/// Параметры создаваемого topic'а.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
    pub timeout: Duration,
}

impl TopicSpec {
    /// Topic с политикой по умолчанию: 1 partition, replication 3, 60s.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication: 3,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_replication(mut self, replication: i32) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ════════════════════════════════════════════════════════════════
//  Messages
// ════════════════════════════════════════════════════════════════

/// Сырое сообщение, прочитанное из topic'а.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Подтверждение доставки от broker'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

// ════════════════════════════════════════════════════════════════
//  BrokerGateway
// ════════════════════════════════════════════════════════════════

/// Обмен сообщениями с broker'ом, включая provisioning topic'ов.
///
/// Реализации: KafkaGateway (rdkafka), MemoryBroker (in-process).
pub trait BrokerGateway: Send + Sync {
    /// Есть ли topic в metadata broker'а. Таймаут 5s, без внутренних retry.
    fn topic_exists(&self, topic: &str)
        -> Pin<Box<dyn Future<Output = Result<bool, BrokerError>> + Send + '_>>;

    /// Создать topic. `TopicAlreadyExists` — не фатально, вызывающий
    /// трактует как успех.
    fn create_topic(&self, spec: &TopicSpec)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    /// Опубликовать payload: ensure topic → send → дождаться ack.
    fn publish(&self, topic: &str, payload: &[u8])
        -> Pin<Box<dyn Future<Output = Result<Delivery, BrokerError>> + Send + '_>>;

    /// Подписаться и дождаться ровно одного сообщения (или `ReadTimeout`).
    /// Ресурс подписки освобождается при возврате. Offset не фиксируется:
    /// без `ack` то же сообщение будет прочитано снова.
    fn subscribe_and_read(&self, topics: &[String], read_timeout: Duration)
        -> Pin<Box<dyn Future<Output = Result<BrokerMessage, BrokerError>> + Send + '_>>;

    /// Зафиксировать, что сообщение обработано (дописано или ушло в
    /// dead letter). Следующее чтение начнётся с `offset + 1`.
    fn ack(&self, message: &BrokerMessage)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}
