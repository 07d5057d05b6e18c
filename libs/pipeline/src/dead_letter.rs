use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sheets_api::BrokerMessage;

use crate::error::EnvelopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    Utf8,
    Base64,
}

/// Envelope, который не удалось дописать, вместе с причиной.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub kind: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub payload_encoding: PayloadEncoding,
    pub payload: String,
    /// Секреты `token` в payload заменены на `<redacted>`.
    #[serde(default)]
    pub token_redacted: bool,
}

const REDACTED: &str = "<redacted>";
const TOKEN_SECRETS: [&str; 2] = ["access_token", "refresh_token"];

/// Замаскировать секреты credential'а в JSON envelope'а. `None`, если
/// payload не JSON object или маскировать нечего.
fn redact_token(text: &str) -> Option<String> {
    let mut value: Value = serde_json::from_str(text).ok()?;
    let token = value.get_mut("token")?.as_object_mut()?;
    let mut touched = false;
    for field in TOKEN_SECRETS {
        if let Some(secret) = token.get_mut(field) {
            *secret = Value::String(REDACTED.into());
            touched = true;
        }
    }
    if !touched {
        return None;
    }
    serde_json::to_string(&value).ok()
}

impl DeadLetter {
    pub fn new(message: &BrokerMessage, error: &EnvelopeError) -> Self {
        let (payload_encoding, payload, token_redacted) = match std::str::from_utf8(&message.payload) {
            Ok(text) => match redact_token(text) {
                Some(redacted) => (PayloadEncoding::Utf8, redacted, true),
                None => (PayloadEncoding::Utf8, text.to_string(), false),
            },
            Err(_) => (
                PayloadEncoding::Base64,
                base64::engine::general_purpose::STANDARD.encode(&message.payload),
                false,
            ),
        };
        Self {
            source_topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            kind: error.kind().to_string(),
            reason: error.to_string(),
            failed_at: Utc::now(),
            payload_encoding,
            payload,
            token_redacted,
        }
    }

    /// Байты сообщения в том виде, в каком они сохранены
    /// (с замаскированным token'ом, если `token_redacted`).
    pub fn stored_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.payload_encoding {
            PayloadEncoding::Utf8 => Ok(self.payload.clone().into_bytes()),
            PayloadEncoding::Base64 => base64::engine::general_purpose::STANDARD.decode(&self.payload),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
