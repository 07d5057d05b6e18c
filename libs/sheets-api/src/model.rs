use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Максимальное число вариантов ответа в одном record'е.
pub const MAX_OPTIONS: usize = 256;

/// Токен считается истёкшим за столько секунд до фактического expiry.
const EXPIRY_SKEW_SECS: i64 = 10;

// ════════════════════════════════════════════════════════════════
//  AccessToken
// ════════════════════════════════════════════════════════════════

/// OAuth2 токен, привязанный к envelope'у (а не к процессу).
///
/// JSON совместим с `{access_token, token_type, refresh_token, expiry}`.
/// Нулевой expiry (`0001-01-01T00:00:00Z`) трактуется как "без срока".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

impl AccessToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Истёк ли токен на момент `now` (с запасом в 10 секунд).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) if expiry.timestamp() > 0 => {
                expiry - chrono::Duration::seconds(EXPIRY_SKEW_SECS) <= now
            }
            _ => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════
//  Questionnaire (business record)
// ════════════════════════════════════════════════════════════════

/// Ответ респондента на один вопрос формы. Все поля nullable,
/// обязательность проверяется валидатором, а не десериализацией.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Questionnaire {
    pub form_id: Option<String>,
    pub question_id: Option<String>,
    pub rule_id: Option<String>,
    pub question_title: Option<String>,
    pub question_rule: Option<String>,
    pub is_required: Option<bool>,
    pub option_id: Option<String>,
    #[serde(deserialize_with = "bounded_options")]
    pub options: Vec<Option<String>>,
    pub question_creation_date: Option<DateTime<Utc>>,
    pub answer: Option<String>,
    pub selected_answer_option: Option<String>,
    #[serde(alias = "answer_on")]
    pub answered_on: Option<DateTime<Utc>>,
    pub respondent_id: Option<String>,
    pub respondent_email: Option<String>,
    pub respondent_phone_number: Option<String>,
    pub org_id: Option<String>,
    pub answer_id: Option<String>,
    pub form_start_date: Option<DateTime<Utc>>,
    pub form_end_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn bounded_options<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let options = Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default();
    if options.len() > MAX_OPTIONS {
        return Err(serde::de::Error::custom(format!(
            "options: {} entries exceed the limit of {MAX_OPTIONS}",
            options.len()
        )));
    }
    Ok(options)
}

// ════════════════════════════════════════════════════════════════
//  RecordEnvelope
// ════════════════════════════════════════════════════════════════

/// Единица работы из broker'а: куда писать, чьим credential'ом и что.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub spreadsheet_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub sheet_id: String,
    pub token: AccessToken,
    pub questionnaire: Questionnaire,
}

impl RecordEnvelope {
    /// Декодировать envelope целиком. Ошибка не оставляет частичного результата.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// ════════════════════════════════════════════════════════════════
//  Sink-side types
// ════════════════════════════════════════════════════════════════

/// Лист внутри документа.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub sheet_id: i64,
    pub title: String,
}

/// Созданный (или прочитанный) документ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub sheets: Vec<SheetInfo>,
}

impl DocumentHandle {
    /// Лист по умолчанию (первый).
    pub fn default_sheet(&self) -> Option<&SheetInfo> {
        self.sheets.first()
    }

    /// Найти лист по числовому id или по заголовку.
    pub fn find_sheet(&self, key: &str) -> Option<&SheetInfo> {
        let by_id = key.parse::<i64>().ok();
        self.sheets
            .iter()
            .find(|s| Some(s.sheet_id) == by_id)
            .or_else(|| self.sheets.iter().find(|s| s.title == key))
    }
}

/// Результат append'а: диапазон, реально занятый новыми строками.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub updated_range: String,
    /// 1-based номер первой записанной строки (если удалось распарсить).
    pub row: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = AccessToken::bearer("t");
        assert!(!token.is_expired());
    }

    #[test]
    fn zero_expiry_is_treated_as_unset() {
        let token: AccessToken = serde_json::from_str(
            r#"{"access_token":"t","token_type":"Bearer","expiry":"0001-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!token.is_expired());
    }

    #[test]
    fn token_expires_with_skew() {
        let now = Utc::now();
        let mut token = AccessToken::bearer("t");
        token.expiry = Some(now + chrono::Duration::seconds(5));
        assert!(token.is_expired_at(now));
        token.expiry = Some(now + chrono::Duration::seconds(60));
        assert!(!token.is_expired_at(now));
    }

    #[test]
    fn token_debug_redacts_secrets() {
        let mut token = AccessToken::bearer("secret-access");
        token.refresh_token = Some("secret-refresh".into());
        let out = format!("{token:?}");
        assert!(!out.contains("secret-access"));
        assert!(!out.contains("secret-refresh"));
    }

    #[test]
    fn envelope_accepts_numeric_sheet_id() {
        let env = RecordEnvelope::decode(
            br#"{"spreadsheet_id":"S1","sheet_id":0,"token":{"access_token":"t"},"questionnaire":{}}"#,
        )
        .unwrap();
        assert_eq!(env.sheet_id, "0");
        assert_eq!(env.token.token_type, "Bearer");
    }

    #[test]
    fn envelope_decode_failure_is_all_or_nothing() {
        let err = RecordEnvelope::decode(
            br#"{"spreadsheet_id":"S1","sheet_id":"0","questionnaire":{}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn answer_on_alias_is_accepted() {
        let q: Questionnaire =
            serde_json::from_str(r#"{"answer_on":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert!(q.answered_on.is_some());
    }

    #[test]
    fn null_options_decode_as_empty() {
        let q: Questionnaire = serde_json::from_str(r#"{"options":null}"#).unwrap();
        assert!(q.options.is_empty());
    }

    #[test]
    fn too_many_options_are_rejected() {
        let options: Vec<String> = (0..=MAX_OPTIONS).map(|i| i.to_string()).collect();
        let json = serde_json::json!({ "options": options });
        assert!(serde_json::from_value::<Questionnaire>(json).is_err());
    }

    #[test]
    fn find_sheet_by_id_or_title() {
        let doc = DocumentHandle {
            id: "S1".into(),
            title: "t".into(),
            url: String::new(),
            sheets: vec![
                SheetInfo { sheet_id: 0, title: "Sheet1".into() },
                SheetInfo { sheet_id: 42, title: "Answers".into() },
            ],
        };
        assert_eq!(doc.find_sheet("42").unwrap().title, "Answers");
        assert_eq!(doc.find_sheet("Sheet1").unwrap().sheet_id, 0);
        assert!(doc.find_sheet("missing").is_none());
    }
}
