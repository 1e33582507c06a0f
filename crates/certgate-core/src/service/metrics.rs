//! Metrics collaborator contract

use std::collections::BTreeMap;

use crate::domain::AuthorityMetrics;

/// Why a call was refused before reaching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    RateLimited,
    CircuitOpen,
}

/// Per-authority health and latency counters
pub trait MetricsStore: Send + Sync {
    /// Record a call that reached the authority (successfully or not)
    fn record_call(&self, authority: &str, success: bool, elapsed_ms: u64, error: Option<&str>);

    /// Record a call refused locally
    fn record_rejection(&self, authority: &str, kind: RejectionKind);

    fn snapshot(&self) -> BTreeMap<String, AuthorityMetrics>;
}
