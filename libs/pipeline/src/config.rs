use std::time::Duration;

use serde::Deserialize;

use sheets_api::DEFAULT_READ_TIMEOUT;

use crate::error::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Ingest Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация ingestion-цикла broker → sheets.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Topic'и, из которых читаются envelope'ы.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Сколько ждать одно сообщение, прежде чем начать новый цикл.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Topic для envelope'ов, которые не удалось дописать.
    /// Без него неудачные envelope'ы только логируются.
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
    /// Пауза после ошибки broker'а (metadata / subscribe).
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT.as_secs()
}
fn default_error_backoff_ms() -> u64 {
    1000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            read_timeout_secs: default_read_timeout_secs(),
            dead_letter_topic: None,
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl IngestConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.topics.is_empty() || self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(PipelineError::Config("ingest.topics must list at least one non-empty topic".into()));
        }
        if self.read_timeout_secs == 0 {
            return Err(PipelineError::Config("ingest.read_timeout_secs must be positive".into()));
        }
        if let Some(dlq) = &self.dead_letter_topic {
            if self.topics.contains(dlq) {
                return Err(PipelineError::Config(format!(
                    "dead letter topic '{dlq}' cannot also be an ingest topic"
                )));
            }
        }
        Ok(())
    }
}
