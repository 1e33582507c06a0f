//! Authority authentication
//!
//! One [`AuthStrategy`] per authority, chosen once from its
//! [`AuthDescriptor`] when the provider is built. The dispatcher asks the
//! [`AuthProvider`] for [`AuthMaterial`] once per call; the material is then
//! reused for every retry attempt of that call.
//!
//! Token-based strategies cache their bearer token and refresh it shortly
//! before expiry, either lazily on demand or from the background task started
//! by [`AuthProvider::spawn_refresh_task`].

mod api_key;
mod hmac;
mod jwt;
mod mtls;
mod oauth;
mod token;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certgate_core::{
    AuthDescriptor, AuthKind, AuthStatus, AuthorityConfig, EventSender, GatewayError,
    GatewayResult, HttpMethod, TokenRefreshSettings,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::EndpointRegistry;

pub use api_key::ApiKeyAuth;
pub use self::hmac::{canonical_request, sign_request, HmacAuth};
pub use jwt::{build_assertion, AssertionClaims, JwtAuth, JWT_BEARER_GRANT};
pub use mtls::{MutualTlsAuth, TlsIdentity};
pub use oauth::{ApiKeyOAuth2Auth, ClientCredentialsAuth};
pub use token::{exchange_token, CachedToken, TokenCell, TokenResponse, TokenSnapshot};

/// Request facts a strategy may sign over
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    pub method: HttpMethod,
    /// Rendered operation path, without host
    pub path: &'a str,
    /// Serialized request body, exactly as sent
    pub body: &'a str,
    /// Unix seconds
    pub timestamp: i64,
}

/// Credentials to attach to one outbound request
#[derive(Debug, Clone, Default)]
pub struct AuthMaterial {
    pub headers: Vec<(String, String)>,
    /// Client identity for transport-level auth
    pub tls: Option<TlsIdentity>,
}

impl AuthMaterial {
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: vec![(name.into(), value.into())],
            tls: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One authentication scheme bound to one authority
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn kind(&self) -> AuthKind;

    /// Produce credentials for a request
    async fn authenticate(&self, ctx: &SigningContext<'_>) -> GatewayResult<AuthMaterial>;

    /// Refresh cached credentials if they are close to expiry.
    /// Static schemes have nothing to do.
    async fn refresh(&self) -> GatewayResult<()> {
        Ok(())
    }

    /// Drop any cached token so the next call exchanges a fresh one
    async fn invalidate(&self) {}

    /// Cached token state, for token-based schemes
    fn token_snapshot(&self) -> Option<TokenSnapshot> {
        None
    }
}

/// Outcome of one refresh sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshSummary {
    pub refreshed: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

/// Per-authority strategy table
pub struct AuthProvider {
    strategies: HashMap<String, Arc<dyn AuthStrategy>>,
}

impl AuthProvider {
    /// Select a strategy for every registered authority
    pub fn from_registry(
        registry: &EndpointRegistry,
        http: reqwest::Client,
        refresh: &TokenRefreshSettings,
        events: EventSender,
    ) -> Self {
        let strategies = registry
            .configs()
            .map(|config| {
                let strategy = build_strategy(config, &http, refresh.buffer_secs, &events);
                debug!(
                    authority = %config.name,
                    kind = ?strategy.kind(),
                    "[Auth] Strategy selected"
                );
                (config.name.clone(), strategy)
            })
            .collect();
        Self { strategies }
    }

    /// Empty provider; strategies are added with [`with_strategy`](Self::with_strategy)
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Replace the strategy for one authority
    pub fn with_strategy(mut self, authority: impl Into<String>, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.strategies.insert(authority.into(), strategy);
        self
    }

    pub async fn authenticate(
        &self,
        authority: &str,
        ctx: &SigningContext<'_>,
    ) -> GatewayResult<AuthMaterial> {
        let strategy = self.strategies.get(authority).ok_or_else(|| {
            GatewayError::Configuration(format!("no auth strategy for '{}'", authority))
        })?;
        strategy.authenticate(ctx).await
    }

    /// Forget the cached token of one authority (after it rejected the token)
    pub async fn invalidate(&self, authority: &str) {
        if let Some(strategy) = self.strategies.get(authority) {
            if strategy.token_snapshot().is_some() {
                debug!(authority, "[Auth] Cached token invalidated");
                strategy.invalidate().await;
            }
        }
    }

    /// Credential state per authority, sorted by name
    pub fn status(&self) -> BTreeMap<String, AuthStatus> {
        self.strategies
            .iter()
            .map(|(name, strategy)| {
                let token = strategy.token_snapshot();
                let status = AuthStatus {
                    kind: strategy.kind(),
                    token_cached: token.as_ref().is_some_and(|t| t.cached),
                    token_expires_at: token.as_ref().and_then(|t| t.expires_at),
                    last_refresh_error: token.and_then(|t| t.last_error),
                };
                (name.clone(), status)
            })
            .collect()
    }

    /// Refresh every token-based strategy whose token is missing or expiring.
    /// Failures are collected; one authority never blocks another.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let mut names: Vec<&String> = self.strategies.keys().collect();
        names.sort();

        for name in names {
            let strategy = &self.strategies[name];
            if strategy.token_snapshot().is_none() {
                continue;
            }
            match strategy.refresh().await {
                Ok(()) => summary.refreshed.push(name.clone()),
                Err(e) => {
                    warn!(authority = %name, error = %e, "[Auth] Background refresh failed");
                    summary.failed.insert(name.clone(), e.to_string());
                }
            }
        }
        summary
    }

    /// Run [`refresh_all`](Self::refresh_all) every `interval` until cancelled
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "[Auth] Token refresh task started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("[Auth] Token refresh task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let summary = self.refresh_all().await;
                        debug!(
                            refreshed = summary.refreshed.len(),
                            failed = summary.failed.len(),
                            "[Auth] Refresh sweep complete"
                        );
                    }
                }
            }
        })
    }
}

fn build_strategy(
    config: &AuthorityConfig,
    http: &reqwest::Client,
    buffer_secs: i64,
    events: &EventSender,
) -> Arc<dyn AuthStrategy> {
    let name = config.name.as_str();
    let timeout = config.timeout();

    match &config.auth {
        AuthDescriptor::ApiKey { header, key } => Arc::new(ApiKeyAuth::new(header, key.clone())),
        AuthDescriptor::ApiKeyOAuth2 {
            header,
            key,
            token_endpoint,
            client_id,
            client_secret,
            scope,
        } => Arc::new(ApiKeyOAuth2Auth::new(
            ApiKeyAuth::new(header, key.clone()),
            ClientCredentialsAuth::new(
                name,
                token_endpoint,
                client_id,
                client_secret.clone(),
                scope.clone(),
                http.clone(),
                timeout,
                buffer_secs,
                events.clone(),
            ),
        )),
        AuthDescriptor::Jwt {
            token_endpoint,
            issuer,
            subject,
            audience,
            signing_secret,
            assertion_ttl_secs,
        } => Arc::new(JwtAuth::new(
            name,
            token_endpoint,
            issuer,
            subject,
            audience.clone(),
            signing_secret.clone(),
            *assertion_ttl_secs,
            http.clone(),
            timeout,
            buffer_secs,
            events.clone(),
        )),
        AuthDescriptor::OAuth2ClientCredentials {
            token_endpoint,
            client_id,
            client_secret,
            scope,
        } => Arc::new(ClientCredentialsAuth::new(
            name,
            token_endpoint,
            client_id,
            client_secret.clone(),
            scope.clone(),
            http.clone(),
            timeout,
            buffer_secs,
            events.clone(),
        )),
        AuthDescriptor::Hmac {
            key_id,
            secret,
            algorithm,
        } => Arc::new(HmacAuth::new(key_id, secret.clone(), *algorithm)),
        AuthDescriptor::MutualTls {
            cert_path,
            key_path,
            ca_path,
        } => Arc::new(MutualTlsAuth::new(
            name,
            TlsIdentity {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
                ca_path: ca_path.clone(),
            },
        )),
    }
}
