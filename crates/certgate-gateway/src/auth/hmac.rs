//! Per-request HMAC signing
//!
//! Canonical string: `METHOD\nPATH\nTIMESTAMP\nBODY`, signed with the
//! authority secret and sent as lowercase hex.

use async_trait::async_trait;
use certgate_core::{AuthKind, GatewayError, GatewayResult, HmacAlgorithm, HttpMethod, Secret};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use super::{AuthMaterial, AuthStrategy, SigningContext};

pub const HEADER_KEY_ID: &str = "X-Key-Id";
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-Signature";
pub const HEADER_ALGORITHM: &str = "X-Signature-Algorithm";

pub fn canonical_request(method: HttpMethod, path: &str, timestamp: i64, body: &str) -> String {
    format!("{}\n{}\n{}\n{}", method.as_str(), path, timestamp, body)
}

/// Sign `canonical` with `secret`. Deterministic for equal inputs.
pub fn sign_request(
    algorithm: HmacAlgorithm,
    secret: &[u8],
    canonical: &str,
) -> GatewayResult<String> {
    let bytes = match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(key_err)?;
            mac.update(canonical.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret).map_err(key_err)?;
            mac.update(canonical.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(hex::encode(bytes))
}

fn key_err(e: hmac::digest::InvalidLength) -> GatewayError {
    GatewayError::Configuration(format!("invalid HMAC key: {}", e))
}

pub struct HmacAuth {
    key_id: String,
    secret: Secret,
    algorithm: HmacAlgorithm,
}

impl HmacAuth {
    pub fn new(key_id: impl Into<String>, secret: Secret, algorithm: HmacAlgorithm) -> Self {
        Self {
            key_id: key_id.into(),
            secret,
            algorithm,
        }
    }
}

#[async_trait]
impl AuthStrategy for HmacAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::Hmac
    }

    async fn authenticate(&self, ctx: &SigningContext<'_>) -> GatewayResult<AuthMaterial> {
        let canonical = canonical_request(ctx.method, ctx.path, ctx.timestamp, ctx.body);
        let signature = sign_request(self.algorithm, self.secret.expose().as_bytes(), &canonical)?;

        Ok(AuthMaterial::header(HEADER_KEY_ID, self.key_id.clone())
            .with_header(HEADER_TIMESTAMP, ctx.timestamp.to_string())
            .with_header(HEADER_SIGNATURE, signature)
            .with_header(HEADER_ALGORITHM, self.algorithm.as_str()))
    }
}
