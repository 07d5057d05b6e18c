use std::future::Future;
use std::pin::Pin;

use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use sheets_api::range::first_row;
use sheets_api::{AccessToken, AppendOutcome, DocumentHandle, SheetInfo, SheetSession, SinkError};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const VALUE_INPUT_OPTION: &str = "RAW";
const INSERT_DATA_OPTION: &str = "INSERT_ROWS";
const HEADER_FIELDS: &str = "userEnteredFormat(verticalAlignment,horizontalAlignment,textFormat)";

// ═══════════════════════════════════════════════════════════════
//  Wire types (Sheets v4)
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    spreadsheet_id: String,
    #[serde(default)]
    spreadsheet_url: String,
    #[serde(default)]
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Default, Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    title: String,
}

impl From<SheetProperties> for SheetInfo {
    fn from(p: SheetProperties) -> Self {
        SheetInfo { sheet_id: p.sheet_id, title: p.title }
    }
}

impl From<Spreadsheet> for DocumentHandle {
    fn from(s: Spreadsheet) -> Self {
        DocumentHandle {
            id: s.spreadsheet_id,
            title: s.properties.title,
            url: s.spreadsheet_url,
            sheets: s.sheets.into_iter().map(|sh| sh.properties.into()).collect(),
        }
    }
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: AppendUpdates,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

// ═══════════════════════════════════════════════════════════════
//  GoogleSheetsSession
// ═══════════════════════════════════════════════════════════════

/// Сессия Sheets REST v4 с bearer-токеном одного envelope'а.
pub struct GoogleSheetsSession {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl GoogleSheetsSession {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: AccessToken) -> Self {
        Self { http, base_url: base_url.into(), token }
    }

    /// `<base>/<segments...>`, каждый сегмент percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, SinkError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SinkError::Client(format!("base url '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::Client(format!("base url '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn exec<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, SinkError> {
        let resp = req
            .bearer_auth(&self.token.access_token)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(format!("sheets request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SinkError::Unavailable(format!("sheets read: {e}")))?;

        match status {
            s if s.is_success() => {
                serde_json::from_str(&body).map_err(|e| SinkError::Decode(e.to_string()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SinkError::CredentialRejected(format!("{status}: {body}")))
            }
            _ => Err(SinkError::Remote { status: status.as_u16(), body }),
        }
    }

    async fn batch_update(&self, document_id: &str, requests: Value) -> Result<BatchUpdateResponse, SinkError> {
        let url = self.url(&[&format!("{document_id}:batchUpdate")])?;
        self.exec(self.http.post(url).json(&json!({ "requests": requests })))
            .await
            .map_err(|e| not_found(e, document_id))
    }
}

/// 404 на уровне документа — отдельная ошибка.
fn not_found(err: SinkError, document_id: &str) -> SinkError {
    match err {
        SinkError::Remote { status: 404, .. } => SinkError::DocumentNotFound(document_id.to_string()),
        other => other,
    }
}

impl SheetSession for GoogleSheetsSession {
    fn create_document(&self, title: &str)
        -> Pin<Box<dyn Future<Output = Result<DocumentHandle, SinkError>> + Send + '_>>
    {
        let title = title.to_string();
        Box::pin(async move {
            let url = self.url(&[])?;
            let body = json!({ "properties": { "title": title } });
            let sheet: Spreadsheet = self.exec(self.http.post(url).json(&body)).await?;
            let handle = DocumentHandle::from(sheet);
            tracing::info!(document = %handle.id, title = %handle.title, "spreadsheet created");
            Ok(handle)
        })
    }

    fn document(&self, document_id: &str)
        -> Pin<Box<dyn Future<Output = Result<DocumentHandle, SinkError>> + Send + '_>>
    {
        let document_id = document_id.to_string();
        Box::pin(async move {
            let url = self.url(&[&document_id])?;
            let sheet: Spreadsheet = self
                .exec(self.http.get(url).query(&[("includeGridData", "false")]))
                .await
                .map_err(|e| not_found(e, &document_id))?;
            Ok(sheet.into())
        })
    }

    fn add_sheet(&self, document_id: &str, title: &str)
        -> Pin<Box<dyn Future<Output = Result<SheetInfo, SinkError>> + Send + '_>>
    {
        let document_id = document_id.to_string();
        let title = title.to_string();
        Box::pin(async move {
            let requests = json!([{ "addSheet": { "properties": { "title": title } } }]);
            let resp = self.batch_update(&document_id, requests).await?;
            let properties = resp
                .replies
                .into_iter()
                .next()
                .and_then(|mut reply| reply.pointer_mut("/addSheet/properties").map(Value::take))
                .ok_or_else(|| SinkError::Decode("addSheet reply without properties".into()))?;
            let properties: SheetProperties =
                serde_json::from_value(properties).map_err(|e| SinkError::Decode(e.to_string()))?;
            Ok(properties.into())
        })
    }

    fn delete_sheet(&self, document_id: &str, sheet_id: i64)
        -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>
    {
        let document_id = document_id.to_string();
        Box::pin(async move {
            let requests = json!([{ "deleteSheet": { "sheetId": sheet_id } }]);
            self.batch_update(&document_id, requests).await?;
            Ok(())
        })
    }

    fn append_values(&self, document_id: &str, range: &str, rows: Vec<Vec<Value>>)
        -> Pin<Box<dyn Future<Output = Result<AppendOutcome, SinkError>> + Send + '_>>
    {
        let document_id = document_id.to_string();
        let range = range.to_string();
        Box::pin(async move {
            let url = self.url(&[&document_id, "values", &format!("{range}:append")])?;
            let req = self
                .http
                .post(url)
                .query(&[
                    ("valueInputOption", VALUE_INPUT_OPTION),
                    ("insertDataOption", INSERT_DATA_OPTION),
                ])
                .json(&json!({ "majorDimension": "ROWS", "values": rows }));

            let resp: AppendResponse = self.exec(req).await.map_err(|e| match e {
                SinkError::Remote { status, body } => {
                    SinkError::AppendFailed(format!("{range}: {status} {body}"))
                }
                other => other,
            })?;

            let updated_range = resp.updates.updated_range;
            Ok(AppendOutcome { row: first_row(&updated_range), updated_range })
        })
    }

    fn format_header(&self, document_id: &str, sheet_id: i64, columns: usize)
        -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>
    {
        let document_id = document_id.to_string();
        Box::pin(async move {
            let requests = json!([
                {
                    "repeatCell": {
                        "range": {
                            "sheetId": sheet_id,
                            "startRowIndex": 0,
                            "endRowIndex": 1,
                            "startColumnIndex": 0,
                            "endColumnIndex": columns,
                        },
                        "cell": {
                            "userEnteredFormat": {
                                "verticalAlignment": "MIDDLE",
                                "horizontalAlignment": "CENTER",
                                "textFormat": { "bold": true },
                            }
                        },
                        "fields": HEADER_FIELDS,
                    }
                },
                {
                    "updateSheetProperties": {
                        "properties": {
                            "sheetId": sheet_id,
                            "gridProperties": { "frozenRowCount": 1 },
                        },
                        "fields": "gridProperties.frozenRowCount",
                    }
                }
            ]);
            self.batch_update(&document_id, requests).await?;
            Ok(())
        })
    }

    fn read_values(&self, document_id: &str, range: &str)
        -> Pin<Box<dyn Future<Output = Result<Vec<Vec<Value>>, SinkError>> + Send + '_>>
    {
        let document_id = document_id.to_string();
        let range = range.to_string();
        Box::pin(async move {
            let url = self.url(&[&document_id, "values", &range])?;
            let values: ValueRange = self
                .exec(self.http.get(url))
                .await
                .map_err(|e| not_found(e, &document_id))?;
            Ok(values.values)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(base: &str) -> GoogleSheetsSession {
        GoogleSheetsSession::new(reqwest::Client::new(), base, AccessToken::bearer("t"))
    }

    #[test]
    fn url_encodes_ranges_as_one_segment() {
        let url = session(DEFAULT_BASE_URL)
            .url(&["S1", "values", "'My Sheet'!R1C1:R1C3:append"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/S1/values/'My%20Sheet'!R1C1:R1C3:append"
        );
    }

    #[test]
    fn url_tolerates_trailing_slash() {
        let url = session("http://127.0.0.1:1/v4/spreadsheets/").url(&["S1"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:1/v4/spreadsheets/S1");
    }

    #[test]
    fn spreadsheet_maps_to_handle() {
        let raw = json!({
            "spreadsheetId": "S1",
            "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/S1",
            "properties": { "title": "Answers" },
            "sheets": [
                { "properties": { "sheetId": 0, "title": "Sheet1" } },
                { "properties": { "sheetId": 7, "title": "Extra" } }
            ]
        });
        let handle: DocumentHandle = serde_json::from_value::<Spreadsheet>(raw).unwrap().into();
        assert_eq!(handle.id, "S1");
        assert_eq!(handle.title, "Answers");
        assert_eq!(handle.sheets.len(), 2);
        assert_eq!(handle.find_sheet("7").unwrap().title, "Extra");
    }

    #[test]
    fn missing_document_maps_to_not_found() {
        let err = not_found(SinkError::Remote { status: 404, body: String::new() }, "S1");
        assert!(matches!(err, SinkError::DocumentNotFound(ref id) if id == "S1"));
        let err = not_found(SinkError::Remote { status: 500, body: String::new() }, "S1");
        assert!(matches!(err, SinkError::Remote { status: 500, .. }));
    }
}
