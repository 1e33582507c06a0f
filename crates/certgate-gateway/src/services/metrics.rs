use std::collections::BTreeMap;

use certgate_core::{AuthorityMetrics, MetricsStore, RejectionKind};
use chrono::Utc;
use dashmap::DashMap;

/// Process-local metrics, one entry per authority
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    entries: DashMap<String, AuthorityMetrics>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, authority: &str) -> Option<AuthorityMetrics> {
        self.entries.get(authority).map(|m| m.clone())
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn record_call(&self, authority: &str, success: bool, elapsed_ms: u64, error: Option<&str>) {
        let mut metrics = self.entries.entry(authority.to_string()).or_default();
        let settled = metrics.successes + metrics.failures;

        // Running mean over settled calls
        metrics.average_latency_ms = (metrics.average_latency_ms * settled as f64
            + elapsed_ms as f64)
            / (settled + 1) as f64;
        metrics.max_latency_ms = metrics.max_latency_ms.max(elapsed_ms);
        metrics.total_calls += 1;
        if success {
            metrics.successes += 1;
        } else {
            metrics.failures += 1;
            metrics.last_error = error.map(str::to_string);
        }
        metrics.last_call_at = Some(Utc::now());
    }

    fn record_rejection(&self, authority: &str, kind: RejectionKind) {
        let mut metrics = self.entries.entry(authority.to_string()).or_default();
        metrics.total_calls += 1;
        metrics.rejections += 1;
        metrics.last_error = Some(
            match kind {
                RejectionKind::RateLimited => "rate_limit_exceeded",
                RejectionKind::CircuitOpen => "circuit_open",
            }
            .to_string(),
        );
        metrics.last_call_at = Some(Utc::now());
    }

    fn snapshot(&self) -> BTreeMap<String, AuthorityMetrics> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
