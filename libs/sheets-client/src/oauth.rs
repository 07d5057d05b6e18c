use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;

use sheets_api::{AccessToken, ErrorKind};

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Значение `error_reason`, которым consent-экран сообщает об отказе.
const USER_DENIED: &str = "user_denied";

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Callback, зарегистрированный в консоли OAuth клиента.
    pub redirect_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_scopes() -> Vec<String> { vec![SPREADSHEETS_SCOPE.into()] }
fn default_auth_url() -> String { DEFAULT_AUTH_URL.into() }
fn default_token_url() -> String { DEFAULT_TOKEN_URL.into() }

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: default_scopes(),
            redirect_url: redirect_url.into(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("redirect_url", &self.redirect_url)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid auth grant code to provision access token")]
    InvalidGrantCode,

    #[error("user denied permission")]
    UserDenied,

    #[error("failed to authenticate user due to {0}")]
    Denied(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("oauth url: {0}")]
    Url(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidGrantCode => ErrorKind::Rejected,
            AuthError::UserDenied | AuthError::Denied(_) => ErrorKind::Credential,
            AuthError::Exchange(_) => ErrorKind::Transport,
            AuthError::Url(_) => ErrorKind::Config,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  OAuthClient
// ═══════════════════════════════════════════════════════════════

/// Ответ token endpoint'а.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self) -> AccessToken {
        let mut token = AccessToken::bearer(self.access_token);
        if let Some(token_type) = self.token_type {
            token.token_type = token_type;
        }
        token.refresh_token = self.refresh_token;
        token.expiry = self
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        token
    }
}

/// OAuth2 authorization-code flow для доступа к таблицам.
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// URL consent-экрана, на который редиректится пользователь.
    pub fn begin_login(&self) -> Result<String, AuthError> {
        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("scope", scope.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
            ],
        )
        .map_err(|e| AuthError::Url(format!("{}: {e}", self.config.auth_url)))?;
        Ok(url.into())
    }

    /// Обработать callback consent-экрана.
    ///
    /// Отказ распознаётся раньше проверки кода: при отказе код не приходит.
    pub async fn complete_login(&self, code: &str, error_reason: &str) -> Result<AccessToken, AuthError> {
        match error_reason {
            "" => {}
            USER_DENIED => return Err(AuthError::UserDenied),
            other => return Err(AuthError::Denied(other.to_string())),
        }
        if code.is_empty() {
            return Err(AuthError::InvalidGrantCode);
        }
        self.exchange(code).await
    }

    /// Обменять authorization code на токен.
    pub async fn exchange(&self, code: &str) -> Result<AccessToken, AuthError> {
        if code.is_empty() {
            return Err(AuthError::InvalidGrantCode);
        }
        let resp = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .await
            .inspect_err(|e| tracing::error!(error = %e, "google code exchange failed"))?;
        Ok(resp.into_token())
    }

    /// Обновить истёкший токен по refresh_token. Refresh token
    /// сохраняется, если endpoint не выдал новый.
    pub async fn refresh(&self, token: &AccessToken) -> Result<AccessToken, AuthError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Exchange("token has no refresh_token".into()))?;

        let resp = self
            .request_token(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await?;
        let mut fresh = resp.into_token();
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = token.refresh_token.clone();
        }
        tracing::debug!(expiry = ?fresh.expiry, "access token refreshed");
        Ok(fresh)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Exchange(format!("token request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::Exchange(format!("token read: {e}")))?;
        if !status.is_success() {
            return Err(AuthError::Exchange(format!("{status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|e| AuthError::Exchange(format!("token decode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        let config = OAuthConfig::new("cid", "secret", "http://localhost:8080/api/google-sheets/integrate/callback");
        OAuthClient::new(reqwest::Client::new(), config)
    }

    #[test]
    fn login_url_carries_client_and_scope() {
        let url = Url::parse(&client().begin_login().unwrap()).unwrap();
        assert!(url.as_str().starts_with(DEFAULT_AUTH_URL));
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["scope"], SPREADSHEETS_SCOPE);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/api/google-sheets/integrate/callback");
    }

    #[test]
    fn bad_auth_url_is_a_config_error() {
        let mut config = OAuthConfig::new("cid", "secret", "http://cb");
        config.auth_url = "not a url".into();
        let err = OAuthClient::new(reqwest::Client::new(), config).begin_login().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn denial_is_distinguished() {
        let c = client();
        assert!(matches!(c.complete_login("", "user_denied").await, Err(AuthError::UserDenied)));
        assert!(matches!(
            c.complete_login("code", "access_denied").await,
            Err(AuthError::Denied(ref r)) if r == "access_denied"
        ));
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_exchange() {
        let err = client().complete_login("", "").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrantCode));
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn refresh_requires_refresh_token() {
        let err = client().refresh(&AccessToken::bearer("t")).await.unwrap_err();
        assert!(matches!(err, AuthError::Exchange(_)));
    }

    #[test]
    fn token_response_sets_expiry() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","token_type":"Bearer","refresh_token":"r","expires_in":3599}"#,
        )
        .unwrap();
        let token = resp.into_token();
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert!(!token.is_expired());
        assert!(token.expiry.is_some());
    }
}
