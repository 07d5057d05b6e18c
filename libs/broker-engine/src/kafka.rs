use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaResult, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};
use serde::Deserialize;

use sheets_api::{
    BrokerError, BrokerGateway, BrokerMessage, Delivery, TopicSpec, METADATA_TIMEOUT,
};

use crate::registry::{ensure_topic, TopicRegistration};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Deserialize)]
pub struct KafkaConfig {
    /// `host:port[,host:port]`.
    pub brokers: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    #[serde(default = "default_sasl_mechanism")]
    pub sasl_mechanism: String,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Политика создания topic'ов при publish.
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_replication")]
    pub replication: i32,
    #[serde(default = "default_create_timeout_secs")]
    pub create_timeout_secs: u64,
    /// Произвольные свойства librdkafka, перекрывают всё выше.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_group_id() -> String { "sheets-connector".into() }
fn default_security_protocol() -> String { "SASL_SSL".into() }
fn default_sasl_mechanism() -> String { "PLAIN".into() }
fn default_session_timeout_ms() -> u64 { 6000 }
fn default_request_timeout_ms() -> u64 { 100_000 }
fn default_auto_offset_reset() -> String { "earliest".into() }
fn default_partitions() -> i32 { 1 }
fn default_replication() -> i32 { 3 }
fn default_create_timeout_secs() -> u64 { 60 }

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            username: None,
            password: None,
            group_id: default_group_id(),
            security_protocol: default_security_protocol(),
            sasl_mechanism: default_sasl_mechanism(),
            session_timeout_ms: default_session_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            auto_offset_reset: default_auto_offset_reset(),
            partitions: default_partitions(),
            replication: default_replication(),
            create_timeout_secs: default_create_timeout_secs(),
            properties: BTreeMap::new(),
        }
    }

    /// Политика для topic'ов, создаваемых при publish.
    pub fn topic_spec(&self, name: &str) -> TopicSpec {
        TopicSpec::new(name)
            .with_partitions(self.partitions)
            .with_replication(self.replication)
            .with_timeout(Duration::from_secs(self.create_timeout_secs))
    }

    fn base(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers)
            .set("security.protocol", &self.security_protocol);
        if self.security_protocol.starts_with("SASL") {
            cfg.set("sasl.mechanisms", &self.sasl_mechanism);
            if let Some(username) = &self.username {
                cfg.set("sasl.username", username);
            }
            if let Some(password) = &self.password {
                cfg.set("sasl.password", password);
            }
        }
        cfg
    }

    fn with_properties(&self, mut cfg: ClientConfig) -> ClientConfig {
        for (key, value) in &self.properties {
            cfg.set(key, value);
        }
        cfg
    }

    pub fn admin_config(&self) -> ClientConfig {
        self.with_properties(self.base())
    }

    pub fn producer_config(&self) -> ClientConfig {
        let mut cfg = self.base();
        cfg.set("acks", "all")
            .set("request.timeout.ms", self.request_timeout_ms.to_string());
        self.with_properties(cfg)
    }

    pub fn consumer_config(&self) -> ClientConfig {
        let mut cfg = self.base();
        cfg.set("group.id", &self.group_id)
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.auto.commit", "false");
        self.with_properties(cfg)
    }
}

impl std::fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("brokers", &self.brokers)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("group_id", &self.group_id)
            .field("security_protocol", &self.security_protocol)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaGateway
// ═══════════════════════════════════════════════════════════════

/// BrokerGateway поверх librdkafka.
///
/// Producer один на gateway и переиспользуется между publish'ами.
/// Consumer создаётся на каждый `subscribe_and_read` и закрывается
/// после получения одного сообщения, offset при этом не коммитится.
/// `ack` коммитит `offset + 1` от имени той же consumer group.
pub struct KafkaGateway {
    config: KafkaConfig,
    admin: AdminClient<DefaultClientContext>,
    producer: FutureProducer,
    registration: TopicRegistration,
}

impl KafkaGateway {
    pub fn new(config: KafkaConfig) -> Result<Self, BrokerError> {
        let admin = config
            .admin_config()
            .create()
            .map_err(|e| BrokerError::Client(format!("admin client: {e}")))?;
        let producer = config
            .producer_config()
            .create()
            .map_err(|e| BrokerError::Client(format!("producer: {e}")))?;

        tracing::info!(brokers = %config.brokers, group = %config.group_id, "kafka gateway ready");

        Ok(Self {
            config,
            admin,
            producer,
            registration: TopicRegistration::new(),
        })
    }

    pub fn registration(&self) -> &TopicRegistration {
        &self.registration
    }
}

impl BrokerGateway for KafkaGateway {
    fn topic_exists(&self, topic: &str)
        -> Pin<Box<dyn Future<Output = Result<bool, BrokerError>> + Send + '_>>
    {
        let topic = topic.to_string();
        Box::pin(async move {
            // fetch_metadata блокирующий.
            let producer = self.producer.clone();
            tokio::task::spawn_blocking(move || {
                producer
                    .client()
                    .fetch_metadata(None, METADATA_TIMEOUT)
                    .map(|metadata| metadata.topics().iter().any(|t| t.name() == topic))
            })
            .await
            .map_err(|e| BrokerError::MetadataUnavailable(e.to_string()))?
            .map_err(|e| BrokerError::MetadataUnavailable(e.to_string()))
        })
    }

    fn create_topic(&self, spec: &TopicSpec)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>
    {
        let spec = spec.clone();
        Box::pin(async move {
            let new_topic = NewTopic::new(
                &spec.name,
                spec.partitions,
                TopicReplication::Fixed(spec.replication),
            );
            let options = AdminOptions::new().operation_timeout(Some(spec.timeout));

            let results = self
                .admin
                .create_topics(&[new_topic], &options)
                .await
                .map_err(|e| BrokerError::TopicCreationFailed {
                    topic: spec.name.clone(),
                    reason: e.to_string(),
                })?;

            for result in results {
                match result {
                    Ok(_) => {}
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        self.registration.insert(&name).await;
                        return Err(BrokerError::TopicAlreadyExists(name));
                    }
                    Err((name, code)) => {
                        return Err(BrokerError::TopicCreationFailed {
                            topic: name,
                            reason: code.to_string(),
                        });
                    }
                }
            }

            self.registration.insert(&spec.name).await;
            Ok(())
        })
    }

    fn publish(&self, topic: &str, payload: &[u8])
        -> Pin<Box<dyn Future<Output = Result<Delivery, BrokerError>> + Send + '_>>
    {
        let topic = topic.to_string();
        let payload = payload.to_vec();
        Box::pin(async move {
            ensure_topic(self, &self.registration, &self.config.topic_spec(&topic)).await?;

            let record = FutureRecord::<(), [u8]>::to(&topic).payload(payload.as_slice());
            let timeout = Timeout::After(Duration::from_millis(self.config.request_timeout_ms));

            match self.producer.send(record, timeout).await {
                Ok((partition, offset)) => {
                    tracing::debug!(topic = %topic, partition, offset, "message delivered");
                    Ok(Delivery { partition, offset })
                }
                Err((e, message)) => Err(BrokerError::DeliveryFailed {
                    partition: message.partition(),
                    reason: e.to_string(),
                }),
            }
        })
    }

    fn subscribe_and_read(&self, topics: &[String], read_timeout: Duration)
        -> Pin<Box<dyn Future<Output = Result<BrokerMessage, BrokerError>> + Send + '_>>
    {
        let topics = topics.to_vec();
        Box::pin(async move {
            let subscribe_failed = |reason: String| BrokerError::SubscribeFailed {
                topics: topics.clone(),
                reason,
            };

            let consumer: StreamConsumer = self
                .config
                .consumer_config()
                .create()
                .map_err(|e| subscribe_failed(e.to_string()))?;
            let names: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&names)
                .map_err(|e| subscribe_failed(e.to_string()))?;

            let message = match tokio::time::timeout(read_timeout, consumer.recv()).await {
                Err(_) => return Err(BrokerError::ReadTimeout(read_timeout)),
                Ok(Err(e)) => return Err(subscribe_failed(e.to_string())),
                Ok(Ok(message)) => message,
            };

            let owned = message.detach();
            Ok(BrokerMessage {
                topic: owned.topic().to_string(),
                partition: owned.partition(),
                offset: owned.offset(),
                key: owned.key().map(<[u8]>::to_vec),
                payload: owned.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })
        })
    }

    fn ack(&self, message: &BrokerMessage)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>
    {
        let topic = message.topic.clone();
        let partition = message.partition;
        let offset = message.offset;
        let config = self.config.consumer_config();
        Box::pin(async move {
            let commit_failed = |reason: String| BrokerError::CommitFailed {
                topic: topic.clone(),
                partition,
                offset,
                reason,
            };

            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
                .map_err(|e| commit_failed(e.to_string()))?;

            // Синхронный commit блокирует поток.
            tokio::task::spawn_blocking(move || -> KafkaResult<()> {
                let consumer: BaseConsumer = config.create()?;
                consumer.commit(&offsets, CommitMode::Sync)
            })
            .await
            .map_err(|e| commit_failed(e.to_string()))?
            .map_err(|e| commit_failed(e.to_string()))?;

            tracing::trace!(topic = %topic, partition, offset, "offset committed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_waits_for_all_replicas() {
        let cfg = KafkaConfig::new("localhost:9092").producer_config();
        assert_eq!(cfg.get("acks"), Some("all"));
        assert_eq!(cfg.get("request.timeout.ms"), Some("100000"));
        assert_eq!(cfg.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(cfg.get("sasl.mechanisms"), Some("PLAIN"));
    }

    #[test]
    fn consumer_reads_from_earliest_and_commits_manually() {
        let mut config = KafkaConfig::new("localhost:9092");
        config.username = Some("user".into());
        config.password = Some("secret".into());
        let cfg = config.consumer_config();
        assert_eq!(cfg.get("group.id"), Some("sheets-connector"));
        assert_eq!(cfg.get("session.timeout.ms"), Some("6000"));
        assert_eq!(cfg.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(cfg.get("enable.auto.commit"), Some("false"));
        assert_eq!(cfg.get("sasl.username"), Some("user"));
        assert_eq!(cfg.get("sasl.password"), Some("secret"));
    }

    #[test]
    fn plaintext_skips_sasl_settings() {
        let mut config = KafkaConfig::new("localhost:9092");
        config.security_protocol = "PLAINTEXT".into();
        config.username = Some("user".into());
        let cfg = config.admin_config();
        assert_eq!(cfg.get("sasl.mechanisms"), None);
        assert_eq!(cfg.get("sasl.username"), None);
    }

    #[test]
    fn extra_properties_override_defaults() {
        let mut config = KafkaConfig::new("localhost:9092");
        config.properties.insert("acks".into(), "1".into());
        config.properties.insert("client.id".into(), "gsc".into());
        let cfg = config.producer_config();
        assert_eq!(cfg.get("acks"), Some("1"));
        assert_eq!(cfg.get("client.id"), Some("gsc"));
    }

    #[test]
    fn config_defaults_from_toml_like_json() {
        let config: KafkaConfig =
            serde_json::from_str(r#"{"brokers":"b1:9092","username":"u"}"#).unwrap();
        assert_eq!(config.partitions, 1);
        assert_eq!(config.replication, 3);
        let spec = config.topic_spec("answers");
        assert_eq!(spec, TopicSpec::new("answers"));
    }

    #[test]
    fn debug_hides_password() {
        let mut config = KafkaConfig::new("localhost:9092");
        config.password = Some("hunter2".into());
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
