use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use sheets_api::projection::{headers, row};
use sheets_api::range::{header_range, sheet_range};
use sheets_api::{
    AppendOutcome, DocumentHandle, Questionnaire, RecordEnvelope, RecordShape, SheetInfo,
    SheetSession, SinkError, Validate,
};

use crate::error::AppendError;

/// Сколько подготовленных листов помнит engine.
pub const DEFAULT_PREPARED_CAPACITY: usize = 1024;
/// Через сколько подготовленный лист проверяется заново.
pub const DEFAULT_PREPARED_TTL: Duration = Duration::from_secs(3600);

struct Prepared {
    sheet: SheetInfo,
    at: Instant,
    /// Порядок вставки, для вытеснения самого старого.
    seq: u64,
}

// ═══════════════════════════════════════════════════════════════
//  AppendEngine
// ═══════════════════════════════════════════════════════════════

/// Запись record'ов в таблицу через сессию конкретного credential'а.
///
/// Сессия передаётся в каждый вызов и не хранится. Engine помнит
/// только листы, для которых заголовки уже проверены/записаны.
pub struct AppendEngine {
    /// (document, ключ листа из envelope'а) → лист.
    prepared: Mutex<HashMap<(String, String), Prepared>>,
    next_seq: AtomicU64,
    capacity: usize,
    ttl: Duration,
}

impl Default for AppendEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AppendEngine {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_PREPARED_CAPACITY, DEFAULT_PREPARED_TTL)
    }

    /// Engine с ограничением кэша листов: не больше `capacity` записей,
    /// каждая живёт не дольше `ttl`.
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            prepared: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Сколько листов сейчас в кэше.
    pub fn prepared_len(&self) -> usize {
        self.prepared.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Создать документ с листом по умолчанию.
    pub async fn create_document(
        &self,
        session: &dyn SheetSession,
        title: &str,
    ) -> Result<DocumentHandle, SinkError> {
        session.create_document(title).await.map_err(unavailable)
    }

    /// Создать документ и записать строку заголовков на лист по умолчанию.
    pub async fn create_document_with_headers(
        &self,
        session: &dyn SheetSession,
        title: &str,
    ) -> Result<DocumentHandle, SinkError> {
        let document = self.create_document(session, title).await?;
        let sheet = document
            .default_sheet()
            .cloned()
            .ok_or_else(|| SinkError::SheetNotFound(format!("{}: no default sheet", document.id)))?;

        self.append_headers(session, &document.id, &sheet, &headers::<Questionnaire>())
            .await
            .map_err(unavailable)?;
        self.remember(&document.id, &sheet.sheet_id.to_string(), &sheet);
        Ok(document)
    }

    /// Записать строку заголовков в `R1C1:R1C<n>`, затем оформить и
    /// закрепить её. Ошибка оформления не отменяет записанные заголовки.
    pub async fn append_headers(
        &self,
        session: &dyn SheetSession,
        document_id: &str,
        sheet: &SheetInfo,
        headers: &[String],
    ) -> Result<(), SinkError> {
        let values = vec![headers.iter().cloned().map(Value::String).collect()];
        session
            .append_values(document_id, &header_range(&sheet.title, headers.len()), values)
            .await?;

        if let Err(e) = session.format_header(document_id, sheet.sheet_id, headers.len()).await {
            tracing::warn!(
                document = %document_id,
                sheet = %sheet.title,
                error = %e,
                "header formatting failed, headers kept unformatted"
            );
        }
        Ok(())
    }

    /// Проверить, спроецировать и дописать одну строку в конец листа.
    pub async fn append_row<T>(
        &self,
        session: &dyn SheetSession,
        document_id: &str,
        sheet: &SheetInfo,
        record: &T,
    ) -> Result<AppendOutcome, AppendError>
    where
        T: RecordShape + Validate + Sync,
    {
        record.validate()?;
        let values = row(record)?;
        let outcome = session
            .append_values(document_id, &sheet_range(&sheet.title), vec![values])
            .await?;
        Ok(outcome)
    }

    /// Дописать record envelope'а: найти (или создать) лист, при
    /// необходимости записать заголовки, затем `append_row`.
    pub async fn append_envelope(
        &self,
        session: &dyn SheetSession,
        envelope: &RecordEnvelope,
    ) -> Result<AppendOutcome, AppendError> {
        // Невалидный record не должен порождать remote-вызовов.
        envelope.questionnaire.validate()?;

        let sheet = self
            .prepare_sheet(session, &envelope.spreadsheet_id, &envelope.sheet_id)
            .await?;

        let result = self
            .append_row(session, &envelope.spreadsheet_id, &sheet, &envelope.questionnaire)
            .await;
        if let Err(AppendError::AppendFailed(_)) = &result {
            self.forget(&envelope.spreadsheet_id, &envelope.sheet_id);
        }
        result
    }

    /// Число заполненных строк диапазона. Best effort: 0 при ошибке.
    pub async fn row_count(&self, session: &dyn SheetSession, document_id: &str, range: &str) -> usize {
        match session.read_values(document_id, range).await {
            Ok(values) => values.len(),
            Err(e) => {
                tracing::error!(document = %document_id, range = %range, error = %e, "failed to fetch values");
                0
            }
        }
    }

    /// Лист по ключу из envelope'а: числовой sheet id или заголовок.
    /// Пустой ключ — лист по умолчанию. Отсутствующий лист с
    /// нечисловым ключом создаётся; пустой лист получает заголовки.
    async fn prepare_sheet(
        &self,
        session: &dyn SheetSession,
        document_id: &str,
        key: &str,
    ) -> Result<SheetInfo, SinkError> {
        if let Some(sheet) = self.cached(document_id, key) {
            return Ok(sheet);
        }

        let document = session.document(document_id).await?;
        let found = if key.is_empty() {
            document.default_sheet().cloned()
        } else {
            document.find_sheet(key).cloned()
        };

        let sheet = match found {
            Some(sheet) => {
                let existing = session
                    .read_values(document_id, &header_range(&sheet.title, 1))
                    .await?;
                if existing.is_empty() {
                    self.append_headers(session, document_id, &sheet, &headers::<Questionnaire>())
                        .await?;
                }
                sheet
            }
            None if key.parse::<i64>().is_ok() || key.is_empty() => {
                return Err(SinkError::SheetNotFound(format!("{document_id}/{key}")));
            }
            None => {
                let sheet = session.add_sheet(document_id, key).await?;
                tracing::info!(document = %document_id, sheet = %sheet.title, "sheet created");
                self.append_headers(session, document_id, &sheet, &headers::<Questionnaire>())
                    .await?;
                sheet
            }
        };

        self.remember(document_id, key, &sheet);
        Ok(sheet)
    }

    fn cached(&self, document_id: &str, key: &str) -> Option<SheetInfo> {
        let mut prepared = self.prepared.lock().unwrap_or_else(|e| e.into_inner());
        let cache_key = (document_id.to_string(), key.to_string());
        match prepared.get(&cache_key) {
            Some(entry) if entry.at.elapsed() < self.ttl => Some(entry.sheet.clone()),
            Some(_) => {
                prepared.remove(&cache_key);
                None
            }
            None => None,
        }
    }

    fn remember(&self, document_id: &str, key: &str, sheet: &SheetInfo) {
        let mut prepared = self.prepared.lock().unwrap_or_else(|e| e.into_inner());
        let cache_key = (document_id.to_string(), key.to_string());

        if !prepared.contains_key(&cache_key) && prepared.len() >= self.capacity {
            let ttl = self.ttl;
            prepared.retain(|_, entry| entry.at.elapsed() < ttl);
            if prepared.len() >= self.capacity {
                let oldest = prepared
                    .iter()
                    .min_by_key(|(_, entry)| entry.seq)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    prepared.remove(&oldest);
                }
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        prepared.insert(cache_key, Prepared { sheet: sheet.clone(), at: Instant::now(), seq });
    }

    fn forget(&self, document_id: &str, key: &str) {
        self.prepared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(document_id.to_string(), key.to_string()));
    }
}

/// Транспортные ошибки создания документа → `Unavailable`.
fn unavailable(e: SinkError) -> SinkError {
    match e {
        SinkError::CredentialRejected(_) | SinkError::Unavailable(_) | SinkError::Client(_) => e,
        other => SinkError::Unavailable(other.to_string()),
    }
}
