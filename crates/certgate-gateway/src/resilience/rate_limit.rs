//! Per-authority fixed-window rate limiting.
//!
//! Uses a DashMap to track `(window_start, admitted)` per authority. A window
//! opens with the first admitted call and admits up to
//! `requests_per_window + burst` calls before rejecting. Rejection is purely
//! local: no counters other than this one change.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use certgate_core::RateLimitDescriptor;
use dashmap::DashMap;
use tokio::time::Instant;

/// Window rule for one authority
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    /// Maximum admitted calls within the window, burst included
    pub capacity: u32,
    pub window: Duration,
}

impl From<&RateLimitDescriptor> for RateLimitRule {
    fn from(descriptor: &RateLimitDescriptor) -> Self {
        Self {
            capacity: descriptor.capacity(),
            window: descriptor.window(),
        }
    }
}

/// Shared rate limiter state (clone-friendly via Arc)
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// authority → (window_start, admitted_count)
    buckets: Arc<DashMap<String, (Instant, u32)>>,
    rules: Arc<HashMap<String, RateLimitRule>>,
}

impl RateLimiter {
    pub fn new(rules: HashMap<String, RateLimitRule>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rules: Arc::new(rules),
        }
    }

    /// Admit or reject one call. Returns `true` if the call is within limits.
    /// Authorities without a rule are always admitted.
    pub fn try_acquire(&self, authority: &str) -> bool {
        let Some(rule) = self.rules.get(authority) else {
            return true;
        };

        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(authority.to_string())
            .or_insert_with(|| (now, 0));
        let (window_start, count) = entry.value_mut();

        if now.duration_since(*window_start) >= rule.window {
            // Reset window
            *window_start = now;
            *count = 1;
            return true;
        }

        if *count >= rule.capacity {
            return false;
        }

        *count += 1;
        true
    }

    /// Calls still admissible in the current window
    pub fn remaining(&self, authority: &str) -> Option<u32> {
        let rule = self.rules.get(authority)?;
        let Some(entry) = self.buckets.get(authority) else {
            return Some(rule.capacity);
        };
        let (window_start, count) = *entry.value();
        if window_start.elapsed() >= rule.window {
            Some(rule.capacity)
        } else {
            Some(rule.capacity.saturating_sub(count))
        }
    }
}
