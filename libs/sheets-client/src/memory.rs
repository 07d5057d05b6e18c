use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use sheets_api::range::{quote_sheet, sheet_of};
use sheets_api::{
    AccessToken, AppendOutcome, DocumentHandle, SessionFactory, SheetInfo, SheetSession, SinkError,
};

const DEFAULT_SHEET: &str = "Sheet1";

struct MemorySheet {
    info: SheetInfo,
    rows: Vec<Vec<Value>>,
    header_formatted: bool,
}

struct MemoryDocument {
    title: String,
    sheets: Vec<MemorySheet>,
    next_sheet_id: i64,
}

impl MemoryDocument {
    fn handle(&self, id: &str) -> DocumentHandle {
        DocumentHandle {
            id: id.to_string(),
            title: self.title.clone(),
            url: format!("memory://{id}"),
            sheets: self.sheets.iter().map(|s| s.info.clone()).collect(),
        }
    }

    fn sheet_mut(&mut self, title: &str) -> Option<&mut MemorySheet> {
        self.sheets.iter_mut().find(|s| s.info.title == title)
    }
}

#[derive(Default)]
struct State {
    documents: HashMap<String, MemoryDocument>,
    next_document: u64,
}

/// In-memory табличный store. Общий для всех сессий фабрики.
#[derive(Default)]
pub struct MemorySheets {
    state: Mutex<State>,
    revoked: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    fail_appends: AtomicBool,
    fail_formatting: AtomicBool,
}

impl MemorySheets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Создать документ с заданным id напрямую, минуя сессию.
    pub fn seed_document(&self, id: &str, title: &str) -> DocumentHandle {
        self.lock().insert(id.to_string(), title)
    }

    /// Строки листа (включая заголовок).
    pub fn rows(&self, document_id: &str, sheet_title: &str) -> Vec<Vec<Value>> {
        let mut state = self.lock();
        state
            .documents
            .get_mut(document_id)
            .and_then(|d| d.sheet_mut(sheet_title))
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    pub fn is_header_formatted(&self, document_id: &str, sheet_title: &str) -> bool {
        let mut state = self.lock();
        state
            .documents
            .get_mut(document_id)
            .and_then(|d| d.sheet_mut(sheet_title))
            .is_some_and(|s| s.header_formatted)
    }

    /// Отозвать токен: все его сессии начнут получать `CredentialRejected`.
    pub fn revoke(&self, access_token: &str) {
        self.revoked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(access_token.to_string());
    }

    pub fn is_revoked(&self, access_token: &str) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(access_token)
    }

    /// Число вызовов remote-операций через сессии.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_formatting(&self, fail: bool) {
        self.fail_formatting.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn create(&mut self, title: &str) -> DocumentHandle {
        self.next_document += 1;
        let id = format!("doc-{}", self.next_document);
        self.insert(id, title)
    }

    fn insert(&mut self, id: String, title: &str) -> DocumentHandle {
        let document = MemoryDocument {
            title: title.to_string(),
            sheets: vec![MemorySheet {
                info: SheetInfo { sheet_id: 0, title: DEFAULT_SHEET.into() },
                rows: Vec::new(),
                header_formatted: false,
            }],
            next_sheet_id: 1,
        };
        let handle = document.handle(&id);
        self.documents.insert(id, document);
        handle
    }

    fn document_mut(&mut self, id: &str) -> Result<&mut MemoryDocument, SinkError> {
        self.documents
            .get_mut(id)
            .ok_or_else(|| SinkError::DocumentNotFound(id.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySession
// ═══════════════════════════════════════════════════════════════

pub struct MemorySession {
    sheets: Arc<MemorySheets>,
    access_token: String,
}

impl MemorySession {
    /// Каждая операция — один "remote" вызов; отозванный токен отклоняется.
    fn call(&self) -> Result<MutexGuard<'_, State>, SinkError> {
        self.sheets.calls.fetch_add(1, Ordering::SeqCst);
        if self.sheets.is_revoked(&self.access_token) {
            return Err(SinkError::CredentialRejected("401: token revoked".into()));
        }
        Ok(self.sheets.lock())
    }
}

impl SheetSession for MemorySession {
    fn create_document(&self, title: &str)
        -> Pin<Box<dyn Future<Output = Result<DocumentHandle, SinkError>> + Send + '_>>
    {
        let result = self.call().map(|mut state| state.create(title));
        Box::pin(async move { result })
    }

    fn document(&self, document_id: &str)
        -> Pin<Box<dyn Future<Output = Result<DocumentHandle, SinkError>> + Send + '_>>
    {
        let result = self.call().and_then(|mut state| {
            state.document_mut(document_id).map(|d| d.handle(document_id))
        });
        Box::pin(async move { result })
    }

    fn add_sheet(&self, document_id: &str, title: &str)
        -> Pin<Box<dyn Future<Output = Result<SheetInfo, SinkError>> + Send + '_>>
    {
        let result = self.call().and_then(|mut state| {
            let document = state.document_mut(document_id)?;
            if document.sheet_mut(title).is_some() {
                return Err(SinkError::Remote {
                    status: 400,
                    body: format!("sheet '{title}' already exists"),
                });
            }
            let info = SheetInfo { sheet_id: document.next_sheet_id, title: title.to_string() };
            document.next_sheet_id += 1;
            document.sheets.push(MemorySheet {
                info: info.clone(),
                rows: Vec::new(),
                header_formatted: false,
            });
            Ok(info)
        });
        Box::pin(async move { result })
    }

    fn delete_sheet(&self, document_id: &str, sheet_id: i64)
        -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>
    {
        let result = self.call().and_then(|mut state| {
            let document = state.document_mut(document_id)?;
            let before = document.sheets.len();
            document.sheets.retain(|s| s.info.sheet_id != sheet_id);
            if document.sheets.len() == before {
                return Err(SinkError::SheetNotFound(sheet_id.to_string()));
            }
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn append_values(&self, document_id: &str, range: &str, rows: Vec<Vec<Value>>)
        -> Pin<Box<dyn Future<Output = Result<AppendOutcome, SinkError>> + Send + '_>>
    {
        let fail = self.sheets.fail_appends.load(Ordering::SeqCst);
        let result = self.call().and_then(|mut state| {
            if fail {
                return Err(SinkError::AppendFailed(format!("{range}: injected failure")));
            }
            let title = sheet_of(range);
            let sheet = state
                .document_mut(document_id)?
                .sheet_mut(&title)
                .ok_or_else(|| SinkError::SheetNotFound(title.clone()))?;

            let first = sheet.rows.len() as u32 + 1;
            let width = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
            let last = first + rows.len().saturating_sub(1) as u32;
            sheet.rows.extend(rows);

            Ok(AppendOutcome {
                updated_range: format!("{}!R{first}C1:R{last}C{width}", quote_sheet(&title)),
                row: Some(first),
            })
        });
        Box::pin(async move { result })
    }

    fn format_header(&self, document_id: &str, sheet_id: i64, _columns: usize)
        -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>
    {
        let fail = self.sheets.fail_formatting.load(Ordering::SeqCst);
        let result = self.call().and_then(|mut state| {
            if fail {
                return Err(SinkError::Remote { status: 500, body: "injected failure".into() });
            }
            let sheet = state
                .document_mut(document_id)?
                .sheets
                .iter_mut()
                .find(|s| s.info.sheet_id == sheet_id)
                .ok_or_else(|| SinkError::SheetNotFound(sheet_id.to_string()))?;
            sheet.header_formatted = true;
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn read_values(&self, document_id: &str, range: &str)
        -> Pin<Box<dyn Future<Output = Result<Vec<Vec<Value>>, SinkError>> + Send + '_>>
    {
        let result = self.call().and_then(|mut state| {
            let title = sheet_of(range);
            state
                .document_mut(document_id)?
                .sheet_mut(&title)
                .map(|s| s.rows.clone())
                .ok_or(SinkError::SheetNotFound(title))
        });
        Box::pin(async move { result })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySessionFactory
// ═══════════════════════════════════════════════════════════════

pub struct MemorySessionFactory {
    sheets: Arc<MemorySheets>,
}

impl MemorySessionFactory {
    pub fn new(sheets: Arc<MemorySheets>) -> Self {
        Self { sheets }
    }

    pub fn sheets(&self) -> &Arc<MemorySheets> {
        &self.sheets
    }
}

impl SessionFactory for MemorySessionFactory {
    fn bind(&self, credential: &AccessToken)
        -> Pin<Box<dyn Future<Output = Result<Box<dyn SheetSession>, SinkError>> + Send + '_>>
    {
        let result = if credential.access_token.is_empty() {
            Err(SinkError::CredentialRejected("empty access token".into()))
        } else if credential.is_expired() {
            Err(SinkError::CredentialRejected("access token expired".into()))
        } else if self.sheets.is_revoked(&credential.access_token) {
            Err(SinkError::CredentialRejected("access token revoked".into()))
        } else {
            Ok(Box::new(MemorySession {
                sheets: Arc::clone(&self.sheets),
                access_token: credential.access_token.clone(),
            }) as Box<dyn SheetSession>)
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn session(sheets: &Arc<MemorySheets>, token: &str) -> Box<dyn SheetSession> {
        MemorySessionFactory::new(Arc::clone(sheets))
            .bind(&AccessToken::bearer(token))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn append_reports_inserted_row() {
        let sheets = MemorySheets::new();
        let s = session(&sheets, "t").await;
        let doc = s.create_document("Answers").await.unwrap();
        assert_eq!(doc.default_sheet().unwrap().title, "Sheet1");

        let first = s.append_values(&doc.id, "'Sheet1'!R1C1:R1C2", vec![vec![json!("A"), json!("B")]]).await.unwrap();
        let second = s.append_values(&doc.id, "'Sheet1'", vec![vec![json!(1), json!(2)]]).await.unwrap();
        assert_eq!(first.row, Some(1));
        assert_eq!(second.row, Some(2));
        assert_eq!(second.updated_range, "'Sheet1'!R2C1:R2C2");
        assert_eq!(s.read_values(&doc.id, "'Sheet1'").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sheets_can_be_added_and_deleted() {
        let sheets = MemorySheets::new();
        let s = session(&sheets, "t").await;
        let doc = s.create_document("Answers").await.unwrap();

        let extra = s.add_sheet(&doc.id, "Extra").await.unwrap();
        assert_eq!(extra.sheet_id, 1);
        assert!(s.add_sheet(&doc.id, "Extra").await.is_err());
        assert_eq!(s.document(&doc.id).await.unwrap().sheets.len(), 2);

        s.delete_sheet(&doc.id, extra.sheet_id).await.unwrap();
        assert!(matches!(
            s.delete_sheet(&doc.id, extra.sheet_id).await,
            Err(SinkError::SheetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn bind_rejects_bad_credentials() {
        let sheets = MemorySheets::new();
        let factory = MemorySessionFactory::new(Arc::clone(&sheets));

        assert!(matches!(factory.bind(&AccessToken::bearer("")).await, Err(SinkError::CredentialRejected(_))));

        let mut expired = AccessToken::bearer("old");
        expired.expiry = Some(chrono::Utc::now() - chrono::Duration::minutes(5));
        assert!(matches!(factory.bind(&expired).await, Err(SinkError::CredentialRejected(_))));

        sheets.revoke("gone");
        assert!(matches!(factory.bind(&AccessToken::bearer("gone")).await, Err(SinkError::CredentialRejected(_))));
    }

    #[tokio::test]
    async fn revocation_applies_to_live_sessions() {
        let sheets = MemorySheets::new();
        let s = session(&sheets, "t").await;
        let doc = s.create_document("Answers").await.unwrap();
        sheets.revoke("t");
        let err = s.document(&doc.id).await.unwrap_err();
        assert!(matches!(err, SinkError::CredentialRejected(_)));
        assert_eq!(sheets.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let sheets = MemorySheets::new();
        let s = session(&sheets, "t").await;
        assert!(matches!(s.document("nope").await, Err(SinkError::DocumentNotFound(_))));
    }
}
