//! Метрики ingestion-цикла (facade `metrics`; exporter ставит бинарь).

use std::time::Duration;

pub const ENVELOPES_TOTAL: &str = "connector_envelopes_total";
pub const APPEND_DURATION: &str = "connector_append_duration_seconds";

pub const OUTCOME_APPENDED: &str = "appended";

/// Описания метрик. Без установленного recorder'а — no-op.
pub fn describe() {
    metrics::describe_counter!(ENVELOPES_TOTAL, "Envelopes consumed from the broker, by outcome");
    metrics::describe_histogram!(
        APPEND_DURATION,
        metrics::Unit::Seconds,
        "Time from decode to append completion"
    );
}

pub(crate) fn record(outcome: &'static str, elapsed: Duration) {
    metrics::counter!(ENVELOPES_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(APPEND_DURATION, "outcome" => outcome).record(elapsed.as_secs_f64());
}
