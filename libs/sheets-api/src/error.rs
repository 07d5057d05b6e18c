/// Категория ошибки. Позволяет ingestion-циклу принимать решение
/// (повторить, считать успехом, отбросить envelope) без разбора текста.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient — цикл можно повторить (read timeout, broker недоступен).
    Retryable,
    /// Операция уже выполнена ранее (topic уже существует) — считать успехом.
    AlreadyDone,
    /// Плохой envelope/record — никогда не повторяется.
    Rejected,
    /// Credential отклонён — терминально для envelope, не влияет на другие.
    Credential,
    /// Ошибка транспорта — попытка брошена, процесс продолжает работу.
    Transport,
    /// Неверная конфигурация — фатально на старте.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Retryable => f.write_str("retryable"),
            ErrorKind::AlreadyDone => f.write_str("already_done"),
            ErrorKind::Rejected => f.write_str("rejected"),
            ErrorKind::Credential => f.write_str("credential"),
            ErrorKind::Transport => f.write_str("transport"),
            ErrorKind::Config => f.write_str("config"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Broker errors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("topic '{0}' already exists")]
    TopicAlreadyExists(String),

    #[error("failed to create topic '{topic}': {reason}")]
    TopicCreationFailed { topic: String, reason: String },

    #[error("delivery failed on partition {partition}: {reason}")]
    DeliveryFailed { partition: i32, reason: String },

    #[error("no message within {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("subscribe {topics:?}: {reason}")]
    SubscribeFailed { topics: Vec<String>, reason: String },

    #[error("commit {topic}[{partition}]@{offset}: {reason}")]
    CommitFailed { topic: String, partition: i32, offset: i64, reason: String },

    #[error("broker client: {0}")]
    Client(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::MetadataUnavailable(_)
            | BrokerError::ReadTimeout(_)
            | BrokerError::SubscribeFailed { .. } => ErrorKind::Retryable,
            BrokerError::TopicAlreadyExists(_) => ErrorKind::AlreadyDone,
            BrokerError::TopicCreationFailed { .. }
            | BrokerError::DeliveryFailed { .. }
            | BrokerError::CommitFailed { .. } => ErrorKind::Transport,
            BrokerError::Client(_) => ErrorKind::Config,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sink errors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("credential rejected: {0}")]
    CredentialRejected(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("append failed: {0}")]
    AppendFailed(String),

    #[error("sink responded {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("decode sink response: {0}")]
    Decode(String),

    #[error("sink client: {0}")]
    Client(String),
}

impl SinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SinkError::CredentialRejected(_) => ErrorKind::Credential,
            SinkError::Client(_) => ErrorKind::Config,
            _ => ErrorKind::Transport,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Record errors
// ═══════════════════════════════════════════════════════════════

/// Нарушено первое по порядку правило валидации record'а.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} cannot be empty")]
pub struct ValidationError {
    pub field: &'static str,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Rejected
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("record of shape '{0}' did not serialize to an object")]
    NotAnObject(&'static str),
}
