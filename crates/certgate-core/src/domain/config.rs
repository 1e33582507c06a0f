//! Gateway settings
//!
//! Loaded from JSON after `${env:NAME}` expansion, then validated as a whole
//! before any component is built. Also renders `{placeholder}` operation
//! paths from call bodies.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::authority::{AuthDescriptor, AuthorityConfig, CircuitDescriptor};
use crate::error::{GatewayError, GatewayResult};

lazy_static! {
    static ref ENV_REGEX: Regex = Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Background token refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshSettings {
    /// Interval of the background refresh loop
    #[serde(default = "default_refresh_interval_ms")]
    pub interval_ms: u64,
    /// Tokens expiring within this many seconds are refreshed
    #[serde(default = "default_refresh_buffer_secs")]
    pub buffer_secs: i64,
}

fn default_refresh_interval_ms() -> u64 {
    60_000
}

fn default_refresh_buffer_secs() -> i64 {
    60
}

impl TokenRefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for TokenRefreshSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_refresh_interval_ms(),
            buffer_secs: default_refresh_buffer_secs(),
        }
    }
}

/// Health HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthServerSettings {
    #[serde(default = "default_health_host")]
    pub host: String,
    #[serde(default = "default_health_port")]
    pub port: u16,
}

fn default_health_host() -> String {
    "127.0.0.1".to_string()
}

fn default_health_port() -> u16 {
    9470
}

impl Default for HealthServerSettings {
    fn default() -> Self {
        Self {
            host: default_health_host(),
            port: default_health_port(),
        }
    }
}

/// Complete gateway configuration, injected at process start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    pub authorities: Vec<AuthorityConfig>,
    #[serde(default)]
    pub default_circuit: CircuitDescriptor,
    #[serde(default)]
    pub token_refresh: TokenRefreshSettings,
    #[serde(default)]
    pub health: HealthServerSettings,
}

impl GatewaySettings {
    /// Parse settings from JSON text, expanding `${env:NAME}` references first.
    pub fn from_json_str(raw: &str) -> GatewayResult<Self> {
        let expanded = interpolate_env(raw, |name| std::env::var(name).ok())?;
        let settings: Self = serde_json::from_str(&expanded)
            .map_err(|e| GatewayError::Configuration(format!("invalid settings JSON: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, expand and validate a settings file
    pub async fn load(path: &Path) -> GatewayResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "[Config] Loading gateway settings");
        Self::from_json_str(&raw)
    }

    /// Circuit settings for one authority (its override or the default)
    pub fn circuit_for(&self, authority: &AuthorityConfig) -> CircuitDescriptor {
        authority
            .circuit
            .clone()
            .unwrap_or_else(|| self.default_circuit.clone())
    }

    /// Structural validation; the first problem found is reported.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.authorities.is_empty() {
            return Err(config_err("at least one authority must be configured"));
        }

        let mut seen = HashSet::new();
        for authority in &self.authorities {
            if authority.name.trim().is_empty() {
                return Err(config_err("authority name must not be empty"));
            }
            if !seen.insert(authority.name.as_str()) {
                return Err(config_err(format!(
                    "duplicate authority '{}'",
                    authority.name
                )));
            }
            validate_authority(authority)?;
            validate_circuit(
                &authority.name,
                authority.circuit.as_ref().unwrap_or(&self.default_circuit),
            )?;
        }

        if self.token_refresh.interval_ms == 0 {
            return Err(config_err("token_refresh.interval_ms must be positive"));
        }
        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> GatewayError {
    GatewayError::Configuration(msg.into())
}

fn validate_authority(authority: &AuthorityConfig) -> GatewayResult<()> {
    let name = &authority.name;

    let base = url::Url::parse(&authority.base_url)
        .map_err(|e| config_err(format!("{}: invalid base_url: {}", name, e)))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(config_err(format!(
            "{}: base_url must be http or https",
            name
        )));
    }

    if authority.operations.is_empty() {
        return Err(config_err(format!("{}: no operations configured", name)));
    }
    for (op, entry) in &authority.operations {
        if !entry.path().starts_with('/') {
            return Err(config_err(format!(
                "{}: operation '{}' path must start with '/'",
                name, op
            )));
        }
    }

    if authority.timeout_ms == 0 {
        return Err(config_err(format!("{}: timeout_ms must be positive", name)));
    }
    if authority.retry.max_attempts == 0 {
        return Err(config_err(format!("{}: retry.max_attempts must be >= 1", name)));
    }
    if authority.rate_limit.requests_per_window == 0 {
        return Err(config_err(format!(
            "{}: rate_limit.requests_per_window must be >= 1",
            name
        )));
    }
    if authority.rate_limit.window_ms == 0 {
        return Err(config_err(format!(
            "{}: rate_limit.window_ms must be positive",
            name
        )));
    }

    validate_auth(name, &authority.auth)
}

fn validate_auth(name: &str, auth: &AuthDescriptor) -> GatewayResult<()> {
    let missing = |field: &str| config_err(format!("{}: auth.{} is required", name, field));
    let check_endpoint = |endpoint: &str| -> GatewayResult<()> {
        url::Url::parse(endpoint)
            .map(|_| ())
            .map_err(|e| config_err(format!("{}: invalid token_endpoint: {}", name, e)))
    };

    match auth {
        AuthDescriptor::ApiKey { header, key } => {
            if header.trim().is_empty() {
                return Err(missing("header"));
            }
            if key.is_empty() {
                return Err(missing("key"));
            }
        }
        AuthDescriptor::ApiKeyOAuth2 {
            header,
            key,
            token_endpoint,
            client_id,
            client_secret,
            ..
        } => {
            if header.trim().is_empty() {
                return Err(missing("header"));
            }
            if key.is_empty() {
                return Err(missing("key"));
            }
            check_endpoint(token_endpoint)?;
            if client_id.trim().is_empty() {
                return Err(missing("client_id"));
            }
            if client_secret.is_empty() {
                return Err(missing("client_secret"));
            }
        }
        AuthDescriptor::Jwt {
            token_endpoint,
            issuer,
            subject,
            signing_secret,
            assertion_ttl_secs,
            ..
        } => {
            check_endpoint(token_endpoint)?;
            if issuer.trim().is_empty() {
                return Err(missing("issuer"));
            }
            if subject.trim().is_empty() {
                return Err(missing("subject"));
            }
            if signing_secret.is_empty() {
                return Err(missing("signing_secret"));
            }
            if *assertion_ttl_secs <= 0 {
                return Err(config_err(format!(
                    "{}: auth.assertion_ttl_secs must be positive",
                    name
                )));
            }
        }
        AuthDescriptor::OAuth2ClientCredentials {
            token_endpoint,
            client_id,
            client_secret,
            ..
        } => {
            check_endpoint(token_endpoint)?;
            if client_id.trim().is_empty() {
                return Err(missing("client_id"));
            }
            if client_secret.is_empty() {
                return Err(missing("client_secret"));
            }
        }
        AuthDescriptor::Hmac { key_id, secret, .. } => {
            if key_id.trim().is_empty() {
                return Err(missing("key_id"));
            }
            if secret.is_empty() {
                return Err(missing("secret"));
            }
        }
        AuthDescriptor::MutualTls {
            cert_path,
            key_path,
            ..
        } => {
            if cert_path.as_os_str().is_empty() {
                return Err(missing("cert_path"));
            }
            if key_path.as_os_str().is_empty() {
                return Err(missing("key_path"));
            }
        }
    }
    Ok(())
}

fn validate_circuit(name: &str, circuit: &CircuitDescriptor) -> GatewayResult<()> {
    if circuit.failure_threshold == 0 {
        return Err(config_err(format!(
            "{}: circuit.failure_threshold must be >= 1",
            name
        )));
    }
    if circuit.cooldown_ms == 0 {
        return Err(config_err(format!(
            "{}: circuit.cooldown_ms must be positive",
            name
        )));
    }
    Ok(())
}

/// Replace every `${env:NAME}` in `raw` using `lookup`.
pub fn interpolate_env<F>(raw: &str, lookup: F) -> GatewayResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    let expanded = ENV_REGEX.replace_all(raw, |caps: &regex::Captures| {
        let name = &caps[1];
        match lookup(name) {
            // Values land inside JSON strings
            Some(value) => value.replace('\\', "\\\\").replace('"', "\\\""),
            None => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(config_err(format!(
            "missing environment variable(s): {}",
            missing.join(", ")
        )));
    }
    Ok(expanded.into_owned())
}

/// Fill `{name}` placeholders in an operation path from top-level body fields.
///
/// String and number values are accepted and percent-encoded. A placeholder
/// without a matching field is a validation error.
pub fn render_path(template: &str, body: &serde_json::Value) -> GatewayResult<String> {
    let mut unresolved = None;
    let rendered = PLACEHOLDER_REGEX.replace_all(template, |caps: &regex::Captures| {
        let key = &caps[1];
        match body.get(key) {
            Some(serde_json::Value::String(s)) => encode_segment(s),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                unresolved.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });

    match unresolved {
        Some(key) => Err(GatewayError::Validation(format!(
            "path parameter '{}' missing from request body",
            key
        ))),
        None => Ok(rendered.into_owned()),
    }
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
