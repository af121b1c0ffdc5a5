use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    completion_calls_total: AtomicU64,
    upstream_failures_total: AtomicU64,
    recovered_parses_total: AtomicU64,
    fallback_parses_total: AtomicU64,
    total_completion_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub completion_calls_total: u64,
    pub upstream_failures_total: u64,
    pub recovered_parses_total: u64,
    pub fallback_parses_total: u64,
    pub avg_completion_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("voyage_requests_total").increment(1);
    }

    pub fn observe_completion(&self, purpose: &'static str, duration: Duration) {
        self.completion_calls_total.fetch_add(1, Ordering::Relaxed);
        self.total_completion_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        counter!("voyage_completion_calls_total", "purpose" => purpose).increment(1);
        histogram!("voyage_completion_seconds", "purpose" => purpose)
            .record(duration.as_secs_f64());
    }

    pub fn inc_upstream_failure(&self, purpose: &'static str) {
        self.upstream_failures_total.fetch_add(1, Ordering::Relaxed);
        counter!("voyage_upstream_failures_total", "purpose" => purpose).increment(1);
    }

    pub fn inc_recovered_parse(&self, purpose: &'static str) {
        self.recovered_parses_total.fetch_add(1, Ordering::Relaxed);
        counter!("voyage_recovered_parses_total", "purpose" => purpose).increment(1);
    }

    pub fn inc_fallback_parse(&self, purpose: &'static str) {
        self.fallback_parses_total.fetch_add(1, Ordering::Relaxed);
        counter!("voyage_fallback_parses_total", "purpose" => purpose).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let calls = self.completion_calls_total.load(Ordering::Relaxed);
        let latency = self.total_completion_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            completion_calls_total: calls,
            upstream_failures_total: self.upstream_failures_total.load(Ordering::Relaxed),
            recovered_parses_total: self.recovered_parses_total.load(Ordering::Relaxed),
            fallback_parses_total: self.fallback_parses_total.load(Ordering::Relaxed),
            avg_completion_millis: if calls == 0 {
                0.0
            } else {
                latency as f64 / calls as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,voyage_api=info,voyage_agents=info,voyage_llm=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_completion_latency() {
        let metrics = AppMetrics::default();
        assert_eq!(metrics.snapshot().avg_completion_millis, 0.0);

        metrics.observe_completion("expense", Duration::from_millis(100));
        metrics.observe_completion("expense", Duration::from_millis(300));
        metrics.inc_fallback_parse("expense");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.completion_calls_total, 2);
        assert_eq!(snapshot.fallback_parses_total, 1);
        assert_eq!(snapshot.avg_completion_millis, 200.0);
    }
}
