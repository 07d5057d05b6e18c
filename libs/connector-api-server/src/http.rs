use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect};
use serde::{Deserialize, Serialize};

use sheets_api::{AccessToken, SheetInfo};

use crate::error::ApiError;
use crate::AppState;

// ═══════════════════════════════════════════════════════════════
//  OAuth: GET /api/google-sheets/integrate
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_integrate(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let oauth = state.oauth.as_ref().ok_or(ApiError::OAuthDisabled)?;
    let url = oauth.begin_login()?;
    Ok(Redirect::temporary(&url))
}

// ═══════════════════════════════════════════════════════════════
//  OAuth: GET /api/google-sheets/integrate/callback?code=&error_reason=
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct CallbackParams {
    #[serde(default)]
    code: String,
    #[serde(default)]
    error_reason: String,
}

pub(crate) async fn handle_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    let oauth = state.oauth.as_ref().ok_or(ApiError::OAuthDisabled)?;
    let token = oauth.complete_login(&params.code, &params.error_reason).await?;
    tracing::info!(refreshable = token.can_refresh(), "oauth login completed");
    Ok(axum::Json(token))
}

// ═══════════════════════════════════════════════════════════════
//  POST /api/google-sheets/create {title, token}
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct CreateRequest {
    #[serde(default)]
    title: String,
    token: AccessToken,
}

#[derive(Serialize)]
struct CreateResponse {
    id: String,
    title: String,
    url: String,
    sheets: Vec<SheetInfo>,
    token: AccessToken,
}

pub(crate) async fn handle_create(
    State(state): State<AppState>,
    axum::Json(request): axum::Json<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }

    let session = state.sessions.bind(&request.token).await?;
    let document = state
        .engine
        .create_document_with_headers(&*session, title)
        .await?;

    tracing::info!(document = %document.id, title = %document.title, "spreadsheet created");
    Ok(axum::Json(CreateResponse {
        id: document.id,
        title: document.title,
        url: document.url,
        sheets: document.sheets,
        token: request.token,
    }))
}
