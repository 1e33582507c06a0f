//! Endpoint registry
//!
//! Immutable table of authority configurations, built once from validated
//! [`GatewaySettings`] and shared read-only by every component.

use std::collections::BTreeMap;
use std::sync::Arc;

use certgate_core::{
    render_path, AuthorityConfig, CircuitDescriptor, GatewayError, GatewayResult,
    GatewaySettings, HttpMethod,
};
use serde_json::Value;

/// A resolved operation address
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    /// Base URL joined with the operation path template
    pub full_address: String,
    pub path_template: String,
    pub method: HttpMethod,
    pub config: Arc<AuthorityConfig>,
}

impl ResolvedEndpoint {
    /// Fill path placeholders from the body, returning `(url, path)`
    pub fn render(&self, body: &Value) -> GatewayResult<(String, String)> {
        let path = render_path(&self.path_template, body)?;
        Ok((join_url(&self.config.base_url, &path), path))
    }
}

#[derive(Debug)]
struct RegistryEntry {
    config: Arc<AuthorityConfig>,
    circuit: CircuitDescriptor,
}

/// Static per-authority configuration table
#[derive(Debug)]
pub struct EndpointRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl EndpointRegistry {
    /// Build the registry from settings, validating them first
    pub fn from_settings(settings: &GatewaySettings) -> GatewayResult<Self> {
        settings.validate()?;
        let entries = settings
            .authorities
            .iter()
            .map(|authority| {
                let entry = RegistryEntry {
                    circuit: settings.circuit_for(authority),
                    config: Arc::new(authority.clone()),
                };
                (authority.name.clone(), entry)
            })
            .collect();
        Ok(Self { entries })
    }

    /// Look up an operation. Unknown authority or operation is a configuration error.
    pub fn resolve(&self, authority: &str, operation: &str) -> GatewayResult<ResolvedEndpoint> {
        let config = self.authority(authority)?;
        let endpoint = config.operation(operation).ok_or_else(|| {
            GatewayError::Configuration(format!(
                "authority '{}' has no operation '{}'",
                authority, operation
            ))
        })?;

        Ok(ResolvedEndpoint {
            full_address: join_url(&config.base_url, endpoint.path()),
            path_template: endpoint.path().to_string(),
            method: endpoint.method(),
            config,
        })
    }

    pub fn authority(&self, authority: &str) -> GatewayResult<Arc<AuthorityConfig>> {
        self.entries
            .get(authority)
            .map(|entry| Arc::clone(&entry.config))
            .ok_or_else(|| {
                GatewayError::Configuration(format!("unknown authority '{}'", authority))
            })
    }

    /// Effective circuit settings for an authority
    pub fn circuit(&self, authority: &str) -> Option<&CircuitDescriptor> {
        self.entries.get(authority).map(|entry| &entry.circuit)
    }

    pub fn contains(&self, authority: &str) -> bool {
        self.entries.contains_key(authority)
    }

    /// Authority names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn configs(&self) -> impl Iterator<Item = &Arc<AuthorityConfig>> {
        self.entries.values().map(|entry| &entry.config)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
