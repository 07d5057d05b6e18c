//! HTTP поверхность коннектора: OAuth login, создание таблиц, `/metrics`.

pub mod error;
mod http;
pub mod metrics;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio_util::sync::CancellationToken;

use pipeline::AppendEngine;
use sheets_api::SessionFactory;
use sheets_client::OAuthClient;

pub use error::ApiError;
pub use metrics::{Observability, ServiceLabels};

#[derive(Clone)]
pub struct AppState {
    /// `None` — OAuth endpoints отвечают 503.
    pub oauth: Option<Arc<OAuthClient>>,
    pub sessions: Arc<dyn SessionFactory>,
    pub engine: Arc<AppendEngine>,
    pub observability: Observability,
}

impl FromRef<AppState> for Observability {
    fn from_ref(state: &AppState) -> Self {
        state.observability.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/google-sheets/integrate", get(http::handle_integrate))
        .route("/api/google-sheets/integrate/callback", get(http::handle_callback))
        .route("/api/google-sheets/create", post(http::handle_create))
        .route("/metrics", get(metrics::serve_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.observability.clone(),
            metrics::track,
        ))
        .with_state(state)
}

/// HTTP API сервер. Останавливается по `shutdown`, дожидаясь активных запросов.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;

    tracing::info!(port, "http api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
