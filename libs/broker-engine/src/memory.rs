use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use sheets_api::{BrokerError, BrokerGateway, BrokerMessage, Delivery, TopicSpec};

use crate::registry::{ensure_topic, TopicRegistration};

#[derive(Default)]
struct State {
    /// topic → append-only лог.
    logs: HashMap<String, Vec<BrokerMessage>>,
    /// topic → offset первого неподтверждённого сообщения.
    cursors: HashMap<String, usize>,
}

/// In-process broker: topic'и — append-only логи, курсор один на
/// gateway и сдвигается только `ack`. Используется для локального
/// запуска и тестов.
pub struct MemoryBroker {
    state: Mutex<State>,
    notify: Notify,
    available: AtomicBool,
    registration: TopicRegistration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
            registration: TopicRegistration::new(),
        }
    }

    /// Выключатель доступности: при `false` metadata и subscribe падают.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Все сообщения topic'а (включая прочитанные).
    pub fn messages(&self, topic: &str) -> Vec<BrokerMessage> {
        self.lock().logs.get(topic).cloned().unwrap_or_default()
    }

    /// Сколько сообщений topic'а ещё не подтверждено.
    pub fn pending(&self, topic: &str) -> usize {
        let state = self.lock();
        let len = state.logs.get(topic).map_or(0, Vec::len);
        len - state.cursors.get(topic).copied().unwrap_or(0).min(len)
    }

    pub fn registration(&self) -> &TopicRegistration {
        &self.registration
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn peek_next(&self, topics: &[String]) -> Option<BrokerMessage> {
        let state = self.lock();
        let State { logs, cursors } = &*state;
        for topic in topics {
            let Some(log) = logs.get(topic) else { continue };
            let cursor = cursors.get(topic).copied().unwrap_or(0);
            if let Some(message) = log.get(cursor) {
                return Some(message.clone());
            }
        }
        None
    }
}

impl BrokerGateway for MemoryBroker {
    fn topic_exists(&self, topic: &str)
        -> Pin<Box<dyn Future<Output = Result<bool, BrokerError>> + Send + '_>>
    {
        let topic = topic.to_string();
        Box::pin(async move {
            if !self.is_available() {
                return Err(BrokerError::MetadataUnavailable("broker is offline".into()));
            }
            Ok(self.lock().logs.contains_key(&topic))
        })
    }

    fn create_topic(&self, spec: &TopicSpec)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>
    {
        let spec = spec.clone();
        Box::pin(async move {
            if !self.is_available() {
                return Err(BrokerError::TopicCreationFailed {
                    topic: spec.name,
                    reason: "broker is offline".into(),
                });
            }
            if spec.partitions < 1 || spec.replication < 1 {
                return Err(BrokerError::TopicCreationFailed {
                    topic: spec.name,
                    reason: "partitions and replication must be positive".into(),
                });
            }
            {
                let mut state = self.lock();
                if state.logs.contains_key(&spec.name) {
                    return Err(BrokerError::TopicAlreadyExists(spec.name));
                }
                state.logs.insert(spec.name.clone(), Vec::new());
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
            ensure_topic(self, &self.registration, &TopicSpec::new(&topic)).await?;
            if !self.is_available() {
                return Err(BrokerError::DeliveryFailed {
                    partition: 0,
                    reason: "broker is offline".into(),
                });
            }

            let delivery = {
                let mut state = self.lock();
                let log = state.logs.entry(topic.clone()).or_default();
                let offset = log.len() as i64;
                log.push(BrokerMessage {
                    topic: topic.clone(),
                    partition: 0,
                    offset,
                    key: None,
                    payload,
                });
                Delivery { partition: 0, offset }
            };
            self.notify.notify_waiters();
            Ok(delivery)
        })
    }

    fn subscribe_and_read(&self, topics: &[String], read_timeout: Duration)
        -> Pin<Box<dyn Future<Output = Result<BrokerMessage, BrokerError>> + Send + '_>>
    {
        let topics = topics.to_vec();
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + read_timeout;
            loop {
                if !self.is_available() {
                    return Err(BrokerError::SubscribeFailed {
                        topics,
                        reason: "broker is offline".into(),
                    });
                }

                // Подписка на уведомление до проверки лога, чтобы не
                // потерять publish между проверкой и ожиданием.
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(message) = self.peek_next(&topics) {
                    return Ok(message);
                }

                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return Err(BrokerError::ReadTimeout(read_timeout));
                }
            }
        })
    }

    fn ack(&self, message: &BrokerMessage)
        -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>
    {
        let message = message.clone();
        Box::pin(async move {
            if !self.is_available() {
                return Err(BrokerError::CommitFailed {
                    topic: message.topic,
                    partition: message.partition,
                    offset: message.offset,
                    reason: "broker is offline".into(),
                });
            }
            let next = usize::try_from(message.offset + 1).unwrap_or(0);
            let mut state = self.lock();
            let cursor = state.cursors.entry(message.topic).or_insert(0);
            *cursor = (*cursor).max(next);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use sheets_api::ErrorKind;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn second_create_reports_already_exists() {
        let broker = MemoryBroker::new();
        broker.create_topic(&TopicSpec::new("answers")).await.unwrap();
        let err = broker.create_topic(&TopicSpec::new("answers")).await.unwrap_err();
        assert!(matches!(err, BrokerError::TopicAlreadyExists(ref t) if t == "answers"));
        assert_eq!(err.kind(), ErrorKind::AlreadyDone);
    }

    #[tokio::test]
    async fn publish_creates_topic_and_registers_it() {
        let broker = MemoryBroker::new();
        assert!(!broker.topic_exists("answers").await.unwrap());

        let delivery = broker.publish("answers", b"one").await.unwrap();
        assert_eq!(delivery, Delivery { partition: 0, offset: 0 });
        assert!(broker.topic_exists("answers").await.unwrap());
        assert!(broker.registration().contains("answers").await);

        let delivery = broker.publish("answers", b"two").await.unwrap();
        assert_eq!(delivery.offset, 1);
    }

    #[tokio::test]
    async fn read_returns_messages_in_order() {
        let broker = MemoryBroker::new();
        broker.publish("answers", b"one").await.unwrap();
        broker.publish("answers", b"two").await.unwrap();

        let topics = vec!["answers".to_string()];
        let first = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        broker.ack(&first).await.unwrap();
        let second = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        broker.ack(&second).await.unwrap();
        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
        assert!(first.offset < second.offset);
        assert_eq!(broker.pending("answers"), 0);
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered() {
        let broker = MemoryBroker::new();
        broker.publish("answers", b"one").await.unwrap();
        broker.publish("answers", b"two").await.unwrap();

        let topics = vec!["answers".to_string()];
        let first = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        let again = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(broker.pending("answers"), 2);

        broker.ack(&again).await.unwrap();
        let next = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        assert_eq!(next.payload, b"two");
        assert_eq!(broker.pending("answers"), 1);
    }

    #[tokio::test]
    async fn ack_never_moves_the_cursor_back() {
        let broker = MemoryBroker::new();
        broker.publish("answers", b"one").await.unwrap();
        broker.publish("answers", b"two").await.unwrap();

        let topics = vec!["answers".to_string()];
        let first = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        broker.ack(&first).await.unwrap();
        let second = broker.subscribe_and_read(&topics, SHORT).await.unwrap();
        broker.ack(&second).await.unwrap();
        broker.ack(&first).await.unwrap();
        assert_eq!(broker.pending("answers"), 0);
    }

    #[tokio::test]
    async fn offline_broker_rejects_ack() {
        let broker = MemoryBroker::new();
        broker.publish("answers", b"one").await.unwrap();
        let message = broker
            .subscribe_and_read(&["answers".to_string()], SHORT)
            .await
            .unwrap();

        broker.set_available(false);
        let err = broker.ack(&message).await.unwrap_err();
        assert!(matches!(err, BrokerError::CommitFailed { offset: 0, .. }));
        assert_eq!(err.kind(), ErrorKind::Transport);

        broker.set_available(true);
        assert_eq!(broker.pending("answers"), 1);
    }

    #[tokio::test]
    async fn empty_topic_times_out() {
        let broker = MemoryBroker::new();
        let err = broker
            .subscribe_and_read(&["answers".to_string()], SHORT)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::ReadTimeout(_)));
        assert_eq!(err.kind(), ErrorKind::Retryable);
    }

    #[tokio::test]
    async fn waiting_reader_wakes_on_publish() {
        let broker = Arc::new(MemoryBroker::new());
        let reader = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .subscribe_and_read(&["answers".to_string()], Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("answers", b"late").await.unwrap();

        let message = reader.await.unwrap().unwrap();
        assert_eq!(message.payload, b"late");
    }

    #[tokio::test]
    async fn offline_broker_fails_metadata_and_subscribe() {
        let broker = MemoryBroker::new();
        broker.set_available(false);

        let err = broker.topic_exists("answers").await.unwrap_err();
        assert!(matches!(err, BrokerError::MetadataUnavailable(_)));

        let err = broker.publish("answers", b"x").await.unwrap_err();
        assert!(matches!(err, BrokerError::MetadataUnavailable(_)));

        let err = broker
            .subscribe_and_read(&["answers".to_string()], SHORT)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::SubscribeFailed { .. }));

        broker.set_available(true);
        assert!(broker.publish("answers", b"x").await.is_ok());
    }

    #[tokio::test]
    async fn invalid_topic_policy_fails_creation() {
        let broker = MemoryBroker::new();
        let err = broker
            .create_topic(&TopicSpec::new("bad").with_partitions(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!broker.registration().contains("bad").await);
    }
}
