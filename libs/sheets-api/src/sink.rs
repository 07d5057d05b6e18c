use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::SinkError;
use crate::model::{AccessToken, AppendOutcome, DocumentHandle, SheetInfo};

// ════════════════════════════════════════════════════════════════
//  Sink Session
// ════════════════════════════════════════════════════════════════

/// Аутентифицированная сессия к табличному store'у, привязанная к
/// одному credential'у. Живёт в пределах одного envelope'а.
///
/// Реализации: GoogleSheetsSession (REST), MemorySession.
pub trait SheetSession: Send + Sync {
    /// Создать документ с листом по умолчанию.
    fn create_document(&self, title: &str)
        -> Pin<Box<dyn Future<Output = Result<DocumentHandle, SinkError>> + Send + '_>>;

    /// Прочитать metadata документа (листы).
    fn document(&self, document_id: &str)
        -> Pin<Box<dyn Future<Output = Result<DocumentHandle, SinkError>> + Send + '_>>;

    /// Добавить лист в документ.
    fn add_sheet(&self, document_id: &str, title: &str)
        -> Pin<Box<dyn Future<Output = Result<SheetInfo, SinkError>> + Send + '_>>;

    /// Удалить лист.
    fn delete_sheet(&self, document_id: &str, sheet_id: i64)
        -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Дописать строки в конец таблицы диапазона (insert, без перезаписи).
    fn append_values(&self, document_id: &str, range: &str, rows: Vec<Vec<Value>>)
        -> Pin<Box<dyn Future<Output = Result<AppendOutcome, SinkError>> + Send + '_>>;

    /// Жирный/центрированный первый ряд `columns` колонок + freeze.
    fn format_header(&self, document_id: &str, sheet_id: i64, columns: usize)
        -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;

    /// Прочитать значения диапазона.
    fn read_values(&self, document_id: &str, range: &str)
        -> Pin<Box<dyn Future<Output = Result<Vec<Vec<Value>>, SinkError>> + Send + '_>>;
}

/// Фабрика сессий: credential → сессия. Никогда не кэширует сессии
/// между разными credential'ами.
pub trait SessionFactory: Send + Sync {
    /// `CredentialRejected` — терминально для envelope'а, без retry.
    fn bind(&self, credential: &AccessToken)
        -> Pin<Box<dyn Future<Output = Result<Box<dyn SheetSession>, SinkError>> + Send + '_>>;
}
