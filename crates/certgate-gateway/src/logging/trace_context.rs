//! Trace Context - Call correlation and structured logging

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;
use tracing::{info, info_span, warn, Span};

/// Global call counter for request id generation
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a short, unique request id.
/// Format: `cg-` followed by 10 hex characters (e.g., "cg-00a1b2c3d4")
pub fn generate_request_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    // Counter in the low bits keeps ids unique within one microsecond
    let mixed = (timestamp << 16) ^ counter;
    format!("cg-{:010x}", mixed & 0xFF_FFFF_FFFF)
}

/// Correlation data for one dispatcher call
#[derive(Debug, Clone)]
pub struct CallTrace {
    pub request_id: String,
    pub authority: String,
    pub operation: String,
    pub started_at: Instant,
}

impl CallTrace {
    pub fn new(authority: &str, operation: &str) -> Self {
        Self {
            request_id: generate_request_id(),
            authority: authority.to_string(),
            operation: operation.to_string(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Span that tags every child log line with the request id
    pub fn span(&self) -> Span {
        info_span!(
            "authority_call",
            request_id = %self.request_id,
            authority = %self.authority,
            operation = %self.operation,
        )
    }

    pub fn log_entry(&self) {
        info!(
            request_id = %self.request_id,
            "→ {}/{}",
            self.authority,
            self.operation
        );
    }

    /// Single consolidated exit line
    pub fn log_exit(&self, success: bool, attempts: u32, error: Option<&str>) {
        let elapsed = self.elapsed_ms();
        if success {
            info!(
                request_id = %self.request_id,
                elapsed_ms = elapsed,
                attempts,
                "← {}/{} ok ({}ms)",
                self.authority,
                self.operation,
                elapsed
            );
        } else {
            warn!(
                request_id = %self.request_id,
                elapsed_ms = elapsed,
                attempts,
                "← {}/{} failed ({}ms): {}",
                self.authority,
                self.operation,
                elapsed,
                error.unwrap_or("unknown error")
            );
        }
    }
}
