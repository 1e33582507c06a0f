//! Dispatcher - one logical authority call
//!
//! ```text
//! call(authority, operation, body)
//!   ├─ resolve endpoint, render path
//!   ├─ circuit check (no state change) → CircuitOpen (no attempt)
//!   ├─ rate window                      → RateLimitExceeded (no attempt)
//!   ├─ circuit permit (may start trial)
//!   ├─ authenticate once
//!   ├─ retry loop: transport.send under the authority timeout
//!   ├─ metrics
//!   └─ transform_from_response       → CallOutcome
//! ```
//!
//! `call` never returns an error: every failure is captured in the
//! [`CallOutcome`] so aggregating callers can settle all branches.

mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use certgate_core::{
    CallOutcome, DataTransformService, EventSender, GatewayError, GatewayEvent, GatewayResult,
    HttpMethod, MetricsStore, RejectionKind, TransportErrorKind,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, Instrument};

use crate::auth::{AuthProvider, SigningContext};
use crate::logging::CallTrace;
use crate::registry::EndpointRegistry;
use crate::resilience::{run_with_retry, CircuitBreaker, RateLimitRule, RateLimiter};

pub use transport::{
    AuthorityTransport, HttpTransport, OutboundRequest, RawResponse, REQUEST_ID_HEADER,
};

pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    auth: Arc<AuthProvider>,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    transport: Arc<dyn AuthorityTransport>,
    transform: Arc<dyn DataTransformService>,
    metrics: Arc<dyn MetricsStore>,
    events: EventSender,
}

impl Dispatcher {
    /// Build a dispatcher; rate windows and breakers come from the registry
    pub fn new(
        registry: Arc<EndpointRegistry>,
        auth: Arc<AuthProvider>,
        transport: Arc<dyn AuthorityTransport>,
        transform: Arc<dyn DataTransformService>,
        metrics: Arc<dyn MetricsStore>,
        events: EventSender,
    ) -> Self {
        let rules: HashMap<String, RateLimitRule> = registry
            .configs()
            .map(|config| (config.name.clone(), RateLimitRule::from(&config.rate_limit)))
            .collect();
        let circuits = registry
            .names()
            .filter_map(|name| {
                registry
                    .circuit(name)
                    .map(|circuit| (name.to_string(), circuit.clone()))
            })
            .collect();

        Self {
            rate_limiter: RateLimiter::new(rules),
            breaker: CircuitBreaker::new(circuits, Default::default(), events.clone()),
            registry,
            auth,
            transport,
            transform,
            metrics,
            events,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Make one logical call
    pub async fn call(&self, authority: &str, operation: &str, body: Value) -> CallOutcome {
        let trace = CallTrace::new(authority, operation);
        let span = trace.span();

        async move {
            trace.log_entry();
            let (result, attempts) = self.execute(&trace, body).await;

            let elapsed_ms = trace.elapsed_ms();
            let error_code = result.as_ref().err().map(|e| e.code().to_string());
            trace.log_exit(
                result.is_ok(),
                attempts,
                result.as_ref().err().map(|e| e.to_string()).as_deref(),
            );

            self.events.emit(GatewayEvent::CallCompleted {
                authority: trace.authority.clone(),
                operation: trace.operation.clone(),
                request_id: trace.request_id.clone(),
                success: result.is_ok(),
                attempts,
                elapsed_ms,
                error_code,
            });

            CallOutcome {
                authority: trace.authority.clone(),
                operation: trace.operation.clone(),
                result,
                elapsed_ms,
                request_id: trace.request_id.clone(),
                attempts,
            }
        }
        .instrument(span)
        .await
    }

    /// Returns the result and the number of network attempts made
    async fn execute(&self, trace: &CallTrace, body: Value) -> (GatewayResult<Value>, u32) {
        let authority = trace.authority.as_str();
        let operation = trace.operation.as_str();

        let prepared = self
            .registry
            .resolve(authority, operation)
            .and_then(|endpoint| {
                let (url, path) = endpoint.render(&body)?;
                Ok((endpoint, url, path))
            });
        let (endpoint, url, path) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return (Err(e), 0),
        };
        let config = &endpoint.config;

        if let Err(e) = self.breaker.check(authority) {
            return self.reject_by_circuit(authority, e);
        }

        if !self.rate_limiter.try_acquire(authority) {
            debug!("[Dispatcher] Rejected by rate window");
            self.metrics
                .record_rejection(authority, RejectionKind::RateLimited);
            self.events.emit(GatewayEvent::RateLimited {
                authority: authority.to_string(),
            });
            return (
                Err(GatewayError::RateLimitExceeded {
                    authority: authority.to_string(),
                }),
                0,
            );
        }

        // Commits to the trial when the cooldown has elapsed
        let mut permit = match self.breaker.acquire(authority) {
            Ok(permit) => permit,
            Err(e) => return self.reject_by_circuit(authority, e),
        };

        let body_text = if endpoint.method == HttpMethod::Get {
            String::new()
        } else {
            body.to_string()
        };

        let material = self
            .auth
            .authenticate(
                authority,
                &SigningContext {
                    method: endpoint.method,
                    path: &path,
                    body: &body_text,
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;
        let material = match material {
            Ok(material) => material,
            Err(e) => {
                self.metrics
                    .record_call(authority, false, trace.elapsed_ms(), Some(e.code()));
                return (Err(e), 0);
            }
        };

        let request = OutboundRequest {
            authority: authority.to_string(),
            operation: operation.to_string(),
            request_id: trace.request_id.clone(),
            method: endpoint.method,
            url,
            path,
            body: body_text,
            headers: material.headers,
            tls: material.tls,
            timeout: config.timeout(),
        };

        let request = &request;
        let transport = &self.transport;
        let outcome = run_with_retry(&config.retry, &mut permit, move |attempt| {
            async move {
                debug!(attempt, "[Dispatcher] Sending");
                match tokio::time::timeout(request.timeout, transport.send(request)).await {
                    Ok(Ok(raw)) => interpret(&request.authority, raw),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(GatewayError::transport(
                        &request.authority,
                        TransportErrorKind::Timeout,
                        format!("no response within {}ms", request.timeout.as_millis()),
                    )),
                }
            }
        })
        .await;

        if let Err(GatewayError::ExternalAuthority { status: 401, .. }) = &outcome.result {
            self.auth.invalidate(authority).await;
        }

        let result = outcome
            .result
            .and_then(|raw| self.transform.transform_from_response(raw, authority, operation));

        self.metrics.record_call(
            authority,
            result.is_ok(),
            trace.elapsed_ms(),
            result.as_ref().err().map(|e| e.code()),
        );
        (result, outcome.attempts)
    }

    fn reject_by_circuit(&self, authority: &str, e: GatewayError) -> (GatewayResult<Value>, u32) {
        debug!("[Dispatcher] Rejected by open circuit");
        self.metrics
            .record_rejection(authority, RejectionKind::CircuitOpen);
        (Err(e), 0)
    }
}

/// Turn an HTTP response into a payload or an authority error
fn interpret(authority: &str, raw: RawResponse) -> GatewayResult<Value> {
    if !raw.is_success() {
        return Err(GatewayError::ExternalAuthority {
            authority: authority.to_string(),
            status: raw.status,
            body: raw.body,
        });
    }
    if raw.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    // Non-JSON bodies are passed on as a string for the transform to handle
    Ok(serde_json::from_str(&raw.body).unwrap_or(Value::String(raw.body)))
}
