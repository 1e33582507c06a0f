//! Mutual TLS authentication
//!
//! Yields a [`TlsIdentity`] instead of headers; the transport builds a client
//! carrying that identity.

use std::path::PathBuf;

use async_trait::async_trait;
use certgate_core::{AuthKind, GatewayError, GatewayResult};

use super::{AuthMaterial, AuthStrategy, SigningContext};

/// PEM files identifying the gateway to an authority
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TlsIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: Option<PathBuf>,
}

/// Client-certificate auth; credentials travel in the TLS handshake, not headers
pub struct MutualTlsAuth {
    authority: String,
    identity: TlsIdentity,
}

impl MutualTlsAuth {
    pub fn new(authority: impl Into<String>, identity: TlsIdentity) -> Self {
        Self {
            authority: authority.into(),
            identity,
        }
    }
}

#[async_trait]
impl AuthStrategy for MutualTlsAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::MutualTls
    }

    async fn authenticate(&self, _ctx: &SigningContext<'_>) -> GatewayResult<AuthMaterial> {
        for path in [&self.identity.cert_path, &self.identity.key_path] {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(GatewayError::authentication(
                    &self.authority,
                    format!("client credential not readable: {}", path.display()),
                ));
            }
        }
        Ok(AuthMaterial {
            headers: Vec::new(),
            tls: Some(self.identity.clone()),
        })
    }
}
