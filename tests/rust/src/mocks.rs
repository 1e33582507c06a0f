//! Mock collaborators for testing
//!
//! A scripted transport standing in for the authorities and an audit sink
//! that keeps every record in memory.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use certgate_core::{AuditRecord, AuditService, GatewayError, GatewayResult, TransportErrorKind};
use certgate_gateway::{AuthorityTransport, OutboundRequest, RawResponse};
use parking_lot::Mutex;
use serde_json::Value;

// ============================================================================
// ScriptedTransport
// ============================================================================

/// What one attempt against an authority does
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer with a status and JSON body
    Json(u16, Value),
    /// Answer with a status and raw body
    Raw(u16, String),
    /// Answer 200 with a JSON body after a delay
    Delayed(Duration, Value),
    /// Fail at the transport level
    Fail(TransportErrorKind),
    /// Never answer
    Hang,
}

impl Scripted {
    pub fn ok(body: Value) -> Self {
        Self::Json(200, body)
    }

    pub fn status(status: u16) -> Self {
        Self::Raw(status, String::new())
    }
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Scripted>,
    fallback: Option<Scripted>,
}

/// Transport that answers from per-authority scripts.
///
/// Queued steps are consumed first, then the fallback repeats. An authority
/// with no script refuses connections.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every attempt for `authority` with `step`
    pub fn always(self, authority: &str, step: Scripted) -> Self {
        self.set_fallback(authority, step);
        self
    }

    /// Queue steps for `authority`, consumed in order before the fallback
    pub fn then(self, authority: &str, steps: Vec<Scripted>) -> Self {
        self.push(authority, steps);
        self
    }

    pub fn set_fallback(&self, authority: &str, step: Scripted) {
        self.scripts
            .lock()
            .entry(authority.to_string())
            .or_default()
            .fallback = Some(step);
    }

    pub fn push(&self, authority: &str, steps: Vec<Scripted>) {
        self.scripts
            .lock()
            .entry(authority.to_string())
            .or_default()
            .queued
            .extend(steps);
    }

    /// Attempts sent to `authority`
    pub fn calls(&self, authority: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.authority == authority)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    fn next_step(&self, authority: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock();
        let script = scripts.get_mut(authority)?;
        script.queued.pop_front().or_else(|| script.fallback.clone())
    }
}

#[async_trait]
impl AuthorityTransport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest) -> GatewayResult<RawResponse> {
        self.requests.lock().push(request.clone());

        match self.next_step(&request.authority) {
            Some(Scripted::Json(status, body)) => Ok(RawResponse::new(status, body.to_string())),
            Some(Scripted::Raw(status, body)) => Ok(RawResponse::new(status, body)),
            Some(Scripted::Delayed(delay, body)) => {
                tokio::time::sleep(delay).await;
                Ok(RawResponse::new(200, body.to_string()))
            }
            Some(Scripted::Fail(kind)) => Err(GatewayError::transport(
                &request.authority,
                kind,
                "scripted failure",
            )),
            Some(Scripted::Hang) => futures::future::pending().await,
            None => Err(GatewayError::transport(
                &request.authority,
                TransportErrorKind::ConnectionRefused,
                "no script",
            )),
        }
    }
}

// ============================================================================
// RecordingAudit
// ============================================================================

#[derive(Default)]
pub struct RecordingAudit {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditService for RecordingAudit {
    async fn create_record(&self, record: AuditRecord) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("audit store unavailable");
        }
        self.records.lock().push(record);
        Ok(())
    }
}
