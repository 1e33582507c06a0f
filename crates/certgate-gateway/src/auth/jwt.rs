//! Signed-assertion strategy
//!
//! Builds an HS256 JWT assertion and exchanges it at the authority's token
//! endpoint with the `jwt-bearer` grant.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use certgate_core::{AuthKind, EventSender, GatewayError, GatewayResult, Secret};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde_json::json;
use sha2::Sha256;

use super::token::{exchange_token, CachedToken, TokenCell, TokenSnapshot};
use super::{AuthMaterial, AuthStrategy, SigningContext};

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Claims carried by an assertion
#[derive(Debug, Clone)]
pub struct AssertionClaims<'a> {
    pub issuer: &'a str,
    pub subject: &'a str,
    pub audience: &'a str,
    pub issued_at: i64,
    pub ttl_secs: i64,
    pub jti: &'a str,
}

/// Encode and sign an HS256 assertion
pub fn build_assertion(claims: &AssertionClaims<'_>, secret: &[u8]) -> GatewayResult<String> {
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    let payload = json!({
        "iss": claims.issuer,
        "sub": claims.subject,
        "aud": claims.audience,
        "iat": claims.issued_at,
        "exp": claims.issued_at + claims.ttl_secs,
        "jti": claims.jti,
    });

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| GatewayError::Configuration(format!("invalid JWT signing key: {}", e)))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

pub struct JwtAuth {
    authority: String,
    token_endpoint: String,
    issuer: String,
    subject: String,
    audience: Option<String>,
    signing_secret: Secret,
    assertion_ttl_secs: i64,
    http: reqwest::Client,
    timeout: Duration,
    buffer_secs: i64,
    cell: TokenCell,
}

impl JwtAuth {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        authority: &str,
        token_endpoint: &str,
        issuer: &str,
        subject: &str,
        audience: Option<String>,
        signing_secret: Secret,
        assertion_ttl_secs: i64,
        http: reqwest::Client,
        timeout: Duration,
        buffer_secs: i64,
        events: EventSender,
    ) -> Self {
        Self {
            authority: authority.to_string(),
            token_endpoint: token_endpoint.to_string(),
            issuer: issuer.to_string(),
            subject: subject.to_string(),
            audience,
            signing_secret,
            assertion_ttl_secs,
            http,
            timeout,
            buffer_secs,
            cell: TokenCell::new(authority, events),
        }
    }

    async fn exchange(&self) -> GatewayResult<CachedToken> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let jti = hex::encode(nonce);

        let claims = AssertionClaims {
            issuer: &self.issuer,
            subject: &self.subject,
            // Audience defaults to the token endpoint itself
            audience: self.audience.as_deref().unwrap_or(&self.token_endpoint),
            issued_at: Utc::now().timestamp(),
            ttl_secs: self.assertion_ttl_secs,
            jti: &jti,
        };
        let assertion = build_assertion(&claims, self.signing_secret.expose().as_bytes())?;

        exchange_token(
            &self.http,
            &self.authority,
            &self.token_endpoint,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
            self.timeout,
        )
        .await
    }

    async fn token(&self) -> GatewayResult<CachedToken> {
        self.cell
            .get_or_refresh(self.buffer_secs, || self.exchange())
            .await
    }
}

#[async_trait]
impl AuthStrategy for JwtAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::Jwt
    }

    async fn authenticate(&self, _ctx: &SigningContext<'_>) -> GatewayResult<AuthMaterial> {
        let token = self.token().await?;
        Ok(AuthMaterial::header("Authorization", token.authorization_header()))
    }

    async fn refresh(&self) -> GatewayResult<()> {
        self.token().await.map(|_| ())
    }

    async fn invalidate(&self) {
        self.cell.invalidate().await;
    }

    fn token_snapshot(&self) -> Option<TokenSnapshot> {
        Some(self.cell.snapshot())
    }
}
