//! Per-authority circuit breaker
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────▶ Open
//!     ▲                                │ cooldown elapsed,
//!     │ trial succeeds                 │ next call admitted as trial
//!     │                                ▼
//!     └──────────────────────────── Trial ──▶ Open (cooldown extended)
//!                                        trial fails
//! ```
//!
//! Only one trial is in flight while in Trial; other callers are refused
//! without a network attempt. [`CircuitBreaker::check`] answers whether a
//! call would be refused without changing any state, so callers can run
//! other admission checks before [`CircuitBreaker::acquire`] commits to a
//! trial. Outcomes are reported through the [`CircuitPermit`] returned by
//! `acquire`. A trial permit
//! dropped without an outcome (e.g. the caller was cancelled) puts the circuit
//! back to Open so the next caller can start a trial.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use certgate_core::{
    CircuitDescriptor, CircuitSnapshot, CircuitStatus, EventSender, GatewayError, GatewayEvent,
    GatewayResult,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
struct OpenSince {
    at: Instant,
    wall: DateTime<Utc>,
    cooldown: Duration,
}

impl OpenSince {
    fn now(cooldown: Duration) -> Self {
        Self {
            at: Instant::now(),
            wall: Utc::now(),
            cooldown,
        }
    }

    /// Time left before a trial may be admitted. A cooldown too large to
    /// represent never elapses.
    fn remaining(&self) -> Duration {
        match self.at.checked_add(self.cooldown) {
            Some(until) => until.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }
}

fn open_error(authority: &str, remaining: Duration) -> GatewayError {
    GatewayError::CircuitOpen {
        authority: authority.to_string(),
        retry_after_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open(OpenSince),
    /// Trial call in flight; keeps the open record for revert/extension
    Trial(OpenSince),
}

#[derive(Debug)]
struct CircuitState {
    phase: Phase,
    consecutive_failures: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            phase: Phase::Closed,
            consecutive_failures: 0,
        }
    }
}

struct Inner {
    circuits: DashMap<String, CircuitState>,
    settings: HashMap<String, CircuitDescriptor>,
    default_settings: CircuitDescriptor,
    events: EventSender,
}

impl Inner {
    fn settings(&self, authority: &str) -> &CircuitDescriptor {
        self.settings.get(authority).unwrap_or(&self.default_settings)
    }

    fn on_success(&self, authority: &str, trial: bool) {
        let mut state = self.circuits.entry(authority.to_string()).or_default();
        let phase = state.phase;
        match phase {
            Phase::Closed => state.consecutive_failures = 0,
            Phase::Trial(_) if trial => {
                state.phase = Phase::Closed;
                state.consecutive_failures = 0;
                drop(state);
                info!(authority, "[CircuitBreaker] Trial succeeded, circuit closed");
                self.events.emit(GatewayEvent::CircuitClosed {
                    authority: authority.to_string(),
                });
            }
            // Late result from a call admitted before the circuit opened
            Phase::Open(_) | Phase::Trial(_) => {}
        }
    }

    /// Returns true if the circuit is open afterwards
    fn on_failure(&self, authority: &str, trial: bool) -> bool {
        let settings = self.settings(authority).clone();
        let mut state = self.circuits.entry(authority.to_string()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let phase = state.phase;
        let opened = match phase {
            Phase::Closed if state.consecutive_failures >= settings.failure_threshold => {
                OpenSince::now(settings.cooldown())
            }
            Phase::Trial(since) if trial => OpenSince::now(settings.extended(since.cooldown)),
            Phase::Closed => return false,
            Phase::Open(_) | Phase::Trial(_) => return true,
        };

        state.phase = Phase::Open(opened);
        let failures = state.consecutive_failures;
        drop(state);

        warn!(
            authority,
            consecutive_failures = failures,
            cooldown_ms = opened.cooldown.as_millis() as u64,
            trial,
            "[CircuitBreaker] Circuit opened"
        );
        self.events.emit(GatewayEvent::CircuitOpened {
            authority: authority.to_string(),
            consecutive_failures: failures,
            cooldown_ms: opened.cooldown.as_millis() as u64,
            opened_at: opened.wall,
        });
        true
    }

    fn abandon_trial(&self, authority: &str) {
        if let Some(mut state) = self.circuits.get_mut(authority) {
            if let Phase::Trial(since) = state.phase {
                state.phase = Phase::Open(since);
                drop(state);
                warn!(authority, "[CircuitBreaker] Trial abandoned, circuit back to open");
            }
        }
    }
}

/// Circuit breakers for all authorities (clone-friendly via Arc)
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        settings: HashMap<String, CircuitDescriptor>,
        default_settings: CircuitDescriptor,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                circuits: DashMap::new(),
                settings,
                default_settings,
                events,
            }),
        }
    }

    /// Whether a call would currently be refused. Changes no state and emits
    /// nothing; an elapsed cooldown reports Ok without starting the trial.
    pub fn check(&self, authority: &str) -> GatewayResult<()> {
        let Some(phase) = self.inner.circuits.get(authority).map(|state| state.phase) else {
            return Ok(());
        };
        match phase {
            Phase::Closed => Ok(()),
            Phase::Open(since) => {
                let remaining = since.remaining();
                if remaining.is_zero() {
                    Ok(())
                } else {
                    Err(open_error(authority, remaining))
                }
            }
            Phase::Trial(_) => Err(open_error(authority, Duration::ZERO)),
        }
    }

    /// Ask to make a call. Refused with [`GatewayError::CircuitOpen`] while the
    /// circuit is open or a trial is already in flight.
    pub fn acquire(&self, authority: &str) -> GatewayResult<CircuitPermit> {
        let mut state = self.inner.circuits.entry(authority.to_string()).or_default();

        let phase = state.phase;
        let trial = match phase {
            Phase::Closed => false,
            Phase::Open(since) => {
                let remaining = since.remaining();
                if !remaining.is_zero() {
                    return Err(open_error(authority, remaining));
                }
                state.phase = Phase::Trial(since);
                drop(state);
                info!(authority, "[CircuitBreaker] Cooldown elapsed, admitting trial");
                self.inner.events.emit(GatewayEvent::CircuitTrial {
                    authority: authority.to_string(),
                });
                true
            }
            Phase::Trial(_) => return Err(open_error(authority, Duration::ZERO)),
        };

        Ok(CircuitPermit {
            inner: Arc::clone(&self.inner),
            authority: authority.to_string(),
            trial,
            resolved: false,
        })
    }

    pub fn snapshot(&self, authority: &str) -> CircuitSnapshot {
        let base_cooldown = self.inner.settings(authority).cooldown_ms;
        let Some(state) = self.inner.circuits.get(authority) else {
            return CircuitSnapshot {
                status: CircuitStatus::Closed,
                consecutive_failures: 0,
                opened_at: None,
                cooldown_ms: base_cooldown,
            };
        };

        let (status, opened_at, cooldown_ms) = match state.phase {
            Phase::Closed => (CircuitStatus::Closed, None, base_cooldown),
            Phase::Open(since) => (
                CircuitStatus::Open,
                Some(since.wall),
                since.cooldown.as_millis() as u64,
            ),
            Phase::Trial(since) => (
                CircuitStatus::Trial,
                Some(since.wall),
                since.cooldown.as_millis() as u64,
            ),
        };
        CircuitSnapshot {
            status,
            consecutive_failures: state.consecutive_failures,
            opened_at,
            cooldown_ms,
        }
    }

    pub fn status(&self, authority: &str) -> CircuitStatus {
        self.snapshot(authority).status
    }
}

/// Admission to call one authority. Report every attempt's outcome through it.
pub struct CircuitPermit {
    inner: Arc<Inner>,
    authority: String,
    trial: bool,
    resolved: bool,
}

impl CircuitPermit {
    /// Whether this call is the single call of a trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn record_success(&mut self) {
        self.inner.on_success(&self.authority, self.trial);
        self.resolved = true;
    }

    /// Record a failed attempt. Returns true if the circuit is now open, in
    /// which case no further attempts should be made under this permit.
    pub fn record_failure(&mut self) -> bool {
        let open = self.inner.on_failure(&self.authority, self.trial);
        self.resolved = true;
        open
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if self.trial && !self.resolved {
            self.inner.abandon_trial(&self.authority);
        }
    }
}
