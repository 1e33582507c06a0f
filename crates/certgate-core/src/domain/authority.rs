//! Authority configuration entities
//!
//! One [`AuthorityConfig`] per external authority. Loaded once at startup and
//! never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

/// A credential value that is wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the secret for the duration of one call
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("********")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::new)
    }
}

/// HTTP verb for an authority operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// Operation entry as written in configuration: a bare path or a path with a method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationSpec {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        method: HttpMethod,
    },
}

impl OperationSpec {
    pub fn path(&self) -> &str {
        match self {
            Self::Path(path) | Self::Detailed { path, .. } => path,
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Self::Path(_) => HttpMethod::Post,
            Self::Detailed { method, .. } => *method,
        }
    }
}

/// HMAC digest used for request signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "hmac-sha256",
            Self::Sha512 => "hmac-sha512",
        }
    }
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_assertion_ttl() -> i64 {
    300
}

/// Authentication scheme of an authority, carrying only what that scheme needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuthDescriptor {
    /// Static key header
    #[serde(rename = "api_key")]
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header: String,
        key: Secret,
    },

    /// Static key header plus a client-credentials bearer token
    #[serde(rename = "api_key_oauth2")]
    ApiKeyOAuth2 {
        #[serde(default = "default_api_key_header")]
        header: String,
        key: Secret,
        token_endpoint: String,
        client_id: String,
        client_secret: Secret,
        #[serde(default)]
        scope: Option<String>,
    },

    /// Signed assertion exchanged for a bearer token
    #[serde(rename = "jwt")]
    Jwt {
        token_endpoint: String,
        issuer: String,
        subject: String,
        #[serde(default)]
        audience: Option<String>,
        signing_secret: Secret,
        #[serde(default = "default_assertion_ttl")]
        assertion_ttl_secs: i64,
    },

    /// OAuth2 client-credentials grant
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials {
        token_endpoint: String,
        client_id: String,
        client_secret: Secret,
        #[serde(default)]
        scope: Option<String>,
    },

    /// Per-request keyed signature
    #[serde(rename = "hmac")]
    Hmac {
        key_id: String,
        secret: Secret,
        algorithm: HmacAlgorithm,
    },

    /// Client certificate at the transport layer
    #[serde(rename = "mutual_tls")]
    MutualTls {
        cert_path: PathBuf,
        key_path: PathBuf,
        #[serde(default)]
        ca_path: Option<PathBuf>,
    },
}

/// Auth kind without credentials, for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    ApiKey,
    ApiKeyOauth2,
    Jwt,
    Oauth2ClientCredentials,
    Hmac,
    MutualTls,
}

impl AuthDescriptor {
    pub fn kind(&self) -> AuthKind {
        match self {
            Self::ApiKey { .. } => AuthKind::ApiKey,
            Self::ApiKeyOAuth2 { .. } => AuthKind::ApiKeyOauth2,
            Self::Jwt { .. } => AuthKind::Jwt,
            Self::OAuth2ClientCredentials { .. } => AuthKind::Oauth2ClientCredentials,
            Self::Hmac { .. } => AuthKind::Hmac,
            Self::MutualTls { .. } => AuthKind::MutualTls,
        }
    }

    /// Whether this scheme holds a cached bearer token
    pub fn uses_token(&self) -> bool {
        matches!(
            self,
            Self::ApiKeyOAuth2 { .. } | Self::Jwt { .. } | Self::OAuth2ClientCredentials { .. }
        )
    }
}

/// Fixed-window admission quota
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDescriptor {
    pub requests_per_window: u32,
    pub window_ms: u64,
    #[serde(default)]
    pub burst: u32,
}

impl RateLimitDescriptor {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Hard cap of admitted calls per window
    pub fn capacity(&self) -> u32 {
        self.requests_per_window.saturating_add(self.burst)
    }
}

impl Default for RateLimitDescriptor {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_ms: 60_000,
            burst: 0,
        }
    }
}

/// Delay growth between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Linear,
    #[default]
    Exponential,
}

/// Failure classes an authority allows to be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryableCode {
    Timeout,
    ConnectionReset,
    ConnectionRefused,
    Network,
    Status(u16),
}

/// Retry behaviour for one authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<RetryableCode>,
}

fn default_retryable_codes() -> Vec<RetryableCode> {
    vec![
        RetryableCode::Timeout,
        RetryableCode::ConnectionReset,
        RetryableCode::ConnectionRefused,
        RetryableCode::Status(502),
        RetryableCode::Status(503),
        RetryableCode::Status(504),
    ]
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            backoff: BackoffKind::Exponential,
            max_delay_ms: None,
            retryable_codes: default_retryable_codes(),
        }
    }
}

impl RetryPolicy {
    /// A policy allowing exactly one attempt (used for circuit trials)
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// Linear: `base × retry`. Exponential: `base × 2^(retry-1)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let base = self.base_delay_ms;
        let millis = match self.backoff {
            BackoffKind::Linear => base.saturating_mul(u64::from(retry)),
            BackoffKind::Exponential => {
                let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };
        let millis = match self.max_delay_ms {
            Some(cap) => millis.min(cap),
            None => millis,
        };
        Duration::from_millis(millis)
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitDescriptor {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_cooldown_multiplier")]
    pub cooldown_multiplier: f64,
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_cooldown_multiplier() -> f64 {
    2.0
}

fn default_max_cooldown_ms() -> u64 {
    600_000
}

impl Default for CircuitDescriptor {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            cooldown_multiplier: default_cooldown_multiplier(),
            max_cooldown_ms: default_max_cooldown_ms(),
        }
    }
}

impl CircuitDescriptor {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Cooldown after a failed trial, capped at `max_cooldown_ms`
    pub fn extended(&self, current: Duration) -> Duration {
        let next = current.as_millis() as f64 * self.cooldown_multiplier.max(1.0);
        let capped = next.min(self.max_cooldown_ms.max(self.cooldown_ms) as f64);
        Duration::from_millis(capped as u64)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Static configuration for one external authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    pub name: String,
    pub base_url: String,
    pub operations: BTreeMap<String, OperationSpec>,
    pub auth: AuthDescriptor,
    #[serde(default)]
    pub rate_limit: RateLimitDescriptor,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Overrides the gateway-wide circuit settings
    #[serde(default)]
    pub circuit: Option<CircuitDescriptor>,
}

impl AuthorityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }
}
