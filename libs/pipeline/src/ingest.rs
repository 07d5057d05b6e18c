use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sheets_api::{
    AppendOutcome, BrokerError, BrokerGateway, BrokerMessage, ErrorKind, RecordEnvelope,
    SessionFactory, Validate,
};

use crate::append::AppendEngine;
use crate::config::IngestConfig;
use crate::dead_letter::DeadLetter;
use crate::error::{EnvelopeError, PipelineError};
use crate::metrics;

/// Результат обработки одного сообщения.
pub type EnvelopeOutcome = Result<AppendOutcome, EnvelopeError>;

/// Сообщение для processing stage + канал ответа receiver'у.
struct WorkItem {
    message: BrokerMessage,
    reply: oneshot::Sender<EnvelopeOutcome>,
}

// ═══════════════════════════════════════════════════════════════
//  Ingest
// ═══════════════════════════════════════════════════════════════

/// Всё, что нужно циклу consume → validate → append.
#[derive(Clone)]
pub struct Ingest {
    broker: Arc<dyn BrokerGateway>,
    sessions: Arc<dyn SessionFactory>,
    engine: Arc<AppendEngine>,
    config: IngestConfig,
}

impl Ingest {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        sessions: Arc<dyn SessionFactory>,
        engine: Arc<AppendEngine>,
        config: IngestConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { broker, sessions, engine, config })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Обработать одно сообщение: decode → validate → bind → append.
    /// Неудача логируется и уходит в dead letter topic (если задан).
    pub async fn process(&self, message: &BrokerMessage) -> EnvelopeOutcome {
        let started = Instant::now();
        let result = self.handle(message).await;

        match &result {
            Ok(outcome) => {
                metrics::record(metrics::OUTCOME_APPENDED, started.elapsed());
                tracing::info!(
                    topic = %message.topic,
                    offset = message.offset,
                    range = %outcome.updated_range,
                    "row appended"
                );
            }
            Err(e) => {
                metrics::record(e.outcome(), started.elapsed());
                tracing::warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    kind = %e.kind(),
                    error = %e,
                    "envelope dropped"
                );
                self.dead_letter(message, e).await;
            }
        }
        result
    }

    async fn handle(&self, message: &BrokerMessage) -> EnvelopeOutcome {
        let envelope = RecordEnvelope::decode(&message.payload)
            .map_err(|e| EnvelopeError::Decode(e.to_string()))?;

        envelope.questionnaire.validate()?;

        let session = self.sessions.bind(&envelope.token).await?;
        let outcome = self.engine.append_envelope(&*session, &envelope).await?;
        Ok(outcome)
    }

    async fn dead_letter(&self, message: &BrokerMessage, error: &EnvelopeError) {
        let Some(topic) = &self.config.dead_letter_topic else {
            return;
        };
        let letter = DeadLetter::new(message, error);
        let payload = match letter.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(topic = %topic, error = ?e, "dead letter encode failed");
                return;
            }
        };
        match self.broker.publish(topic, &payload).await {
            Ok(delivery) => {
                tracing::debug!(topic = %topic, offset = delivery.offset, "dead letter published");
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "dead letter publish failed");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Ingest task — receiver stage → capacity-1 channel → processing
// ═══════════════════════════════════════════════════════════════

/// Запустить ingestion: receiver stage читает по одному сообщению,
/// ждёт ответа processing stage и подтверждает сообщение broker'у,
/// прежде чем читать следующее.
///
/// Отмена `token` наблюдается между циклами и во время ожидания
/// broker'а; начатый append доводится до конца.
pub fn spawn_ingest(ingest: Ingest, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let topics = ingest.config.topics.clone();
        let read_timeout = ingest.config.read_timeout();
        let backoff = ingest.config.error_backoff();

        let (work_tx, mut work_rx) = mpsc::channel::<WorkItem>(1);

        // Processing stage
        let processor = {
            let ingest = ingest.clone();
            tokio::spawn(async move {
                while let Some(item) = work_rx.recv().await {
                    let outcome = ingest.process(&item.message).await;
                    let _ = item.reply.send(outcome);
                }
            })
        };

        tracing::info!(topics = ?topics, "ingestion started");

        // Receiver stage
        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                read = ingest.broker.subscribe_and_read(&topics, read_timeout) => read,
            };

            match read {
                Ok(message) => {
                    let (reply_tx, reply_rx) = oneshot::channel();
                    let item = WorkItem { message: message.clone(), reply: reply_tx };
                    if work_tx.send(item).await.is_err() {
                        tracing::error!("processing stage gone");
                        break;
                    }
                    if reply_rx.await.is_err() {
                        tracing::error!("processing stage dropped reply");
                        break;
                    }
                    // И дописанное, и ушедшее в dead letter сообщение
                    // подтверждается только после ответа processing stage.
                    if let Err(e) = ingest.broker.ack(&message).await {
                        tracing::error!(
                            topic = %message.topic,
                            offset = message.offset,
                            error = %e,
                            "ack failed, message will be redelivered"
                        );
                    }
                }
                Err(BrokerError::ReadTimeout(_)) => {
                    tracing::trace!(topics = ?topics, "no message within read timeout");
                }
                Err(e) => {
                    if e.kind() == ErrorKind::Retryable {
                        tracing::warn!(topics = ?topics, error = %e, "broker read failed, backing off");
                    } else {
                        tracing::error!(topics = ?topics, error = %e, "broker read failed, backing off");
                    }
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        drop(work_tx);
        if let Err(e) = processor.await {
            tracing::error!(error = ?e, "processing stage panicked");
        }
        tracing::info!("ingestion stopped");
    })
}
