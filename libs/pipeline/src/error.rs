use sheets_api::{BrokerError, ErrorKind, ProjectionError, SinkError, ValidationError};

/// Ошибка записи одной строки.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("projection: {0}")]
    Projection(#[from] ProjectionError),

    #[error("append: {0}")]
    AppendFailed(#[from] SinkError),
}

impl AppendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppendError::ValidationFailed(_) | AppendError::Projection(_) => ErrorKind::Rejected,
            AppendError::AppendFailed(e) => e.kind(),
        }
    }
}

/// Почему envelope не был дописан. Терминально для envelope'а,
/// на цикл не влияет.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("decode envelope: {0}")]
    Decode(String),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("credential rejected: {0}")]
    CredentialRejected(String),

    #[error("append failed: {0}")]
    AppendFailed(String),
}

impl EnvelopeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvelopeError::Decode(_) | EnvelopeError::ValidationFailed(_) => ErrorKind::Rejected,
            EnvelopeError::CredentialRejected(_) => ErrorKind::Credential,
            EnvelopeError::AppendFailed(_) => ErrorKind::Transport,
        }
    }

    /// Метка `outcome` для метрик.
    pub fn outcome(&self) -> &'static str {
        match self {
            EnvelopeError::Decode(_) => "decode_failed",
            EnvelopeError::ValidationFailed(_) => "validation_failed",
            EnvelopeError::CredentialRejected(_) => "credential_rejected",
            EnvelopeError::AppendFailed(_) => "append_failed",
        }
    }
}

impl From<SinkError> for EnvelopeError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::CredentialRejected(reason) => EnvelopeError::CredentialRejected(reason),
            other => EnvelopeError::AppendFailed(other.to_string()),
        }
    }
}

impl From<AppendError> for EnvelopeError {
    fn from(e: AppendError) -> Self {
        match e {
            AppendError::ValidationFailed(v) => EnvelopeError::ValidationFailed(v),
            AppendError::Projection(p) => EnvelopeError::Decode(p.to_string()),
            AppendError::AppendFailed(s) => s.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("broker: {0}")]
    Broker(#[from] BrokerError),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Broker(e) => e.kind(),
            PipelineError::Encode(_) => ErrorKind::Rejected,
        }
    }
}
