use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sheets_api::SinkError;
use sheets_client::AuthError;

/// Ошибка HTTP handler'а. Тело ответа: `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("oauth is not configured")]
    OAuthDisabled,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::OAuthDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Auth(AuthError::UserDenied) => StatusCode::FORBIDDEN,
            ApiError::Auth(_) => StatusCode::BAD_REQUEST,
            ApiError::Sink(SinkError::CredentialRejected(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Sink(SinkError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Sink(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }
        (status, axum::Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
