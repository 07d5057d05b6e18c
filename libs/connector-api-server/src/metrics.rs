//! HTTP метрики: Prometheus recorder, middleware и `/metrics`.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const RESPONSE_STATUS: &str = "response_status";
pub const REQUESTS_LATENCY: &str = "requests_latency_seconds";
pub const REQUESTS_DURATION: &str = "requests_duration_seconds";

const UNMATCHED_ENDPOINT: &str = "unmatched";
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Установить Prometheus recorder. Повторные вызовы возвращают тот же handle.
fn install_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new()
                .set_buckets_for_metric(Matcher::Full(REQUESTS_LATENCY.into()), LATENCY_BUCKETS)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "latency buckets rejected, using summaries");
                    PrometheusBuilder::new()
                });
            let recorder = builder.build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %e, "metrics recorder already installed");
            }

            describe_counter!(HTTP_REQUESTS_TOTAL, "Total http requests by endpoints");
            describe_counter!(RESPONSE_STATUS, "Response status by endpoints");
            describe_histogram!(REQUESTS_LATENCY, "Requests latency in seconds by endpoints");
            describe_histogram!(REQUESTS_DURATION, "Requests duration in seconds by endpoints");
            pipeline::metrics::describe();

            tracing::info!("prometheus metrics recorder initialized");
            handle
        })
        .clone()
}

// ═══════════════════════════════════════════════════════════════
//  Service labels
// ═══════════════════════════════════════════════════════════════

/// Идентификация сервиса в метках: `<prefix>_id`, `<prefix>_name`, ...
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceLabels {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_prefix() -> String {
    "gsc".into()
}
fn default_name() -> String {
    "google-sheets-connector".into()
}
fn default_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

impl Default for ServiceLabels {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            id: String::new(),
            name: default_name(),
            version: default_version(),
        }
    }
}

impl ServiceLabels {
    fn label(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix)
    }

    fn for_endpoint(&self, endpoint: &str) -> Vec<(String, String)> {
        vec![
            (self.label("id"), self.id.clone()),
            (self.label("name"), self.name.clone()),
            (self.label("version"), self.version.clone()),
            (self.label("endpoint"), endpoint.to_string()),
        ]
    }
}

// ═══════════════════════════════════════════════════════════════
//  Observability
// ═══════════════════════════════════════════════════════════════

/// Метрики процесса. Создаётся на старте и передаётся через state.
#[derive(Clone)]
pub struct Observability {
    handle: PrometheusHandle,
    labels: Arc<ServiceLabels>,
}

impl Observability {
    /// Идемпотентно: recorder ставится один раз на процесс.
    pub fn install(labels: ServiceLabels) -> Self {
        Self {
            handle: install_recorder(),
            labels: Arc::new(labels),
        }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    fn record(&self, endpoint: &str, status: StatusCode, elapsed: f64) {
        let labels = self.labels.for_endpoint(endpoint);

        counter!(HTTP_REQUESTS_TOTAL, labels.as_slice()).increment(1);
        histogram!(REQUESTS_LATENCY, labels.as_slice()).record(elapsed);
        histogram!(REQUESTS_DURATION, labels.as_slice()).record(elapsed);

        let mut with_status = labels;
        with_status.push((self.labels.label("response_status"), status.as_u16().to_string()));
        counter!(RESPONSE_STATUS, with_status.as_slice()).increment(1);
    }
}

fn endpoint_label(request: &Request) -> String {
    request.extensions().get::<MatchedPath>().map_or_else(
        || UNMATCHED_ENDPOINT.to_string(),
        |path| path.as_str().to_string(),
    )
}

/// Middleware: счётчики запросов/статусов и латентность по endpoint'ам.
pub async fn track(State(observability): State<Observability>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let endpoint = endpoint_label(&request);

    let response = next.run(request).await;

    let elapsed = started.elapsed().as_secs_f64();
    observability.record(&endpoint, response.status(), elapsed);
    if elapsed > 1.0 {
        tracing::warn!(endpoint = %endpoint, status = %response.status(), elapsed, "slow request");
    }
    response
}

/// `GET /metrics` — Prometheus text.
pub async fn serve_metrics(State(observability): State<Observability>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        observability.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let a = Observability::install(ServiceLabels::default());
        let b = Observability::install(ServiceLabels { id: "other".into(), ..Default::default() });
        a.record("/x", StatusCode::OK, 0.01);
        assert!(b.render().contains(HTTP_REQUESTS_TOTAL));
    }

    #[test]
    fn labels_use_prefix() {
        let labels = ServiceLabels { id: "svc-1".into(), ..Default::default() }.for_endpoint("/api");
        let keys: Vec<&str> = labels.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["gsc_id", "gsc_name", "gsc_version", "gsc_endpoint"]);
        assert_eq!(labels[0].1, "svc-1");
    }

    #[test]
    fn status_label_is_recorded() {
        let o = Observability::install(ServiceLabels::default());
        o.record("/status-test", StatusCode::UNAUTHORIZED, 0.02);
        let text = o.render();
        assert!(text
            .lines()
            .any(|l| l.starts_with(RESPONSE_STATUS)
                && l.contains("gsc_endpoint=\"/status-test\"")
                && l.contains("gsc_response_status=\"401\"")));
    }
}
