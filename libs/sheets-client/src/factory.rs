use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sheets_api::{AccessToken, SessionFactory, SheetSession, SinkError};

use crate::google::{GoogleSheetsSession, DEFAULT_BASE_URL};
use crate::oauth::OAuthClient;

/// Фабрика Google-сессий. HTTP пул общий, токен у каждой сессии свой.
pub struct GoogleSessionFactory {
    http: reqwest::Client,
    base_url: String,
    oauth: Option<Arc<OAuthClient>>,
}

impl GoogleSessionFactory {
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http, base_url: DEFAULT_BASE_URL.into(), oauth: None }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// OAuth клиент для обновления истёкших токенов.
    pub fn with_oauth(mut self, oauth: Arc<OAuthClient>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    async fn usable_token(&self, credential: AccessToken) -> Result<AccessToken, SinkError> {
        if credential.access_token.is_empty() {
            return Err(SinkError::CredentialRejected("empty access token".into()));
        }
        if !credential.is_expired() {
            return Ok(credential);
        }
        match &self.oauth {
            Some(oauth) if credential.can_refresh() => oauth
                .refresh(&credential)
                .await
                .map_err(|e| SinkError::CredentialRejected(format!("refresh failed: {e}"))),
            _ => Err(SinkError::CredentialRejected("access token expired".into())),
        }
    }
}

impl SessionFactory for GoogleSessionFactory {
    fn bind(&self, credential: &AccessToken)
        -> Pin<Box<dyn Future<Output = Result<Box<dyn SheetSession>, SinkError>> + Send + '_>>
    {
        let credential = credential.clone();
        Box::pin(async move {
            let token = self.usable_token(credential).await?;
            Ok(Box::new(GoogleSheetsSession::new(self.http.clone(), self.base_url.clone(), token))
                as Box<dyn SheetSession>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthConfig;

    #[tokio::test]
    async fn valid_token_binds_without_network() {
        let factory = GoogleSessionFactory::with_client(reqwest::Client::new());
        assert!(factory.bind(&AccessToken::bearer("t")).await.is_ok());
    }

    #[tokio::test]
    async fn expired_token_without_refresh_is_rejected() {
        let oauth = OAuthClient::new(reqwest::Client::new(), OAuthConfig::new("cid", "s", "http://cb"));
        let factory = GoogleSessionFactory::with_client(reqwest::Client::new()).with_oauth(Arc::new(oauth));

        let mut token = AccessToken::bearer("t");
        token.expiry = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
        let err = factory.bind(&token).await.err().unwrap();
        assert!(matches!(err, SinkError::CredentialRejected(_)));
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let factory = GoogleSessionFactory::with_client(reqwest::Client::new());
        let err = factory.bind(&AccessToken::bearer("")).await.err().unwrap();
        assert_eq!(err.kind(), sheets_api::ErrorKind::Credential);
    }
}
