//! Cached bearer tokens
//!
//! Handles token expiry, single-flight refresh and the exchange request
//! shared by the OAuth2 and JWT strategies.

use std::future::Future;
use std::time::Duration as StdDuration;

use certgate_core::{EventSender, GatewayError, GatewayEvent, GatewayResult, Secret};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Bearer token held for one authority
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: Secret,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token response from an OAuth2 token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl From<TokenResponse> for CachedToken {
    fn from(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        // Some servers answer "bearer"; normalize the header scheme
        let token_type = if response.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer".to_string()
        } else {
            response.token_type
        };

        Self {
            access_token: Secret::new(response.access_token),
            token_type,
            expires_at,
        }
    }
}

impl CachedToken {
    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false, // No expiry = never expires
        }
    }

    /// Check if the token will expire within `buffer_seconds`
    pub fn expires_soon(&self, buffer_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + Duration::seconds(buffer_seconds) >= expires_at,
            None => false,
        }
    }

    /// Get the authorization header value
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token.expose())
    }
}

/// Observable token state, readable without awaiting the refresh lock
#[derive(Debug, Clone, Default)]
pub struct TokenSnapshot {
    pub cached: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Per-authority token slot.
///
/// The async mutex serializes refreshes so concurrent callers share one
/// exchange instead of stampeding the token endpoint.
pub struct TokenCell {
    authority: String,
    token: Mutex<Option<CachedToken>>,
    snapshot: RwLock<TokenSnapshot>,
    events: EventSender,
}

impl TokenCell {
    pub fn new(authority: impl Into<String>, events: EventSender) -> Self {
        Self {
            authority: authority.into(),
            token: Mutex::new(None),
            snapshot: RwLock::new(TokenSnapshot::default()),
            events,
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.snapshot.read().clone()
    }

    /// Return the cached token, exchanging a new one when absent or expiring.
    ///
    /// If the exchange fails while the old token is still valid, the old token
    /// is returned and the failure only recorded.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        buffer_secs: i64,
        exchange: F,
    ) -> GatewayResult<CachedToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<CachedToken>>,
    {
        let mut guard = self.token.lock().await;

        if let Some(token) = guard.as_ref() {
            if !token.expires_soon(buffer_secs) {
                return Ok(token.clone());
            }
            debug!(authority = %self.authority, "[Auth] Token expiring, refreshing");
        }

        match exchange().await {
            Ok(token) => {
                info!(
                    authority = %self.authority,
                    expires_at = ?token.expires_at,
                    "[Auth] Token refreshed"
                );
                *self.snapshot.write() = TokenSnapshot {
                    cached: true,
                    expires_at: token.expires_at,
                    last_error: None,
                };
                self.events.emit(GatewayEvent::TokenRefreshed {
                    authority: self.authority.clone(),
                    expires_at: token.expires_at,
                });
                *guard = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                self.snapshot.write().last_error = Some(e.to_string());
                self.events.emit(GatewayEvent::TokenRefreshFailed {
                    authority: self.authority.clone(),
                    reason: e.to_string(),
                });
                match guard.as_ref() {
                    Some(token) if !token.is_expired() => {
                        warn!(
                            authority = %self.authority,
                            error = %e,
                            "[Auth] Refresh failed, using still-valid token"
                        );
                        Ok(token.clone())
                    }
                    _ => {
                        *guard = None;
                        self.snapshot.write().cached = false;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Drop the cached token (e.g. after the authority rejected it)
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
        self.snapshot.write().cached = false;
    }
}

/// POST a form to a token endpoint and parse the token.
///
/// Every failure maps to [`GatewayError::Authentication`]; exchange errors
/// are never retried.
pub async fn exchange_token(
    http: &reqwest::Client,
    authority: &str,
    token_endpoint: &str,
    form: &[(&str, &str)],
    timeout: StdDuration,
) -> GatewayResult<CachedToken> {
    debug!(authority, endpoint = token_endpoint, "[Auth] Exchanging credentials");

    let response = http
        .post(token_endpoint)
        .timeout(timeout)
        .form(form)
        .send()
        .await
        .map_err(|e| {
            GatewayError::authentication(authority, format!("token endpoint unreachable: {}", e))
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::authentication(
            authority,
            format!("token exchange failed: HTTP {} - {}", status, body),
        ));
    }

    let token: TokenResponse = response.json().await.map_err(|e| {
        GatewayError::authentication(authority, format!("invalid token response: {}", e))
    })?;
    if token.access_token.is_empty() {
        return Err(GatewayError::authentication(
            authority,
            "token response has empty access_token",
        ));
    }
    Ok(token.into())
}
