//! OAuth2 client-credentials strategies

use std::time::Duration;

use async_trait::async_trait;
use certgate_core::{AuthKind, EventSender, GatewayResult, Secret};

use super::api_key::ApiKeyAuth;
use super::token::{exchange_token, CachedToken, TokenCell, TokenSnapshot};
use super::{AuthMaterial, AuthStrategy, SigningContext};

/// Bearer token obtained with the client-credentials grant
pub struct ClientCredentialsAuth {
    authority: String,
    token_endpoint: String,
    client_id: String,
    client_secret: Secret,
    scope: Option<String>,
    http: reqwest::Client,
    timeout: Duration,
    buffer_secs: i64,
    cell: TokenCell,
}

impl ClientCredentialsAuth {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        authority: &str,
        token_endpoint: &str,
        client_id: &str,
        client_secret: Secret,
        scope: Option<String>,
        http: reqwest::Client,
        timeout: Duration,
        buffer_secs: i64,
        events: EventSender,
    ) -> Self {
        Self {
            authority: authority.to_string(),
            token_endpoint: token_endpoint.to_string(),
            client_id: client_id.to_string(),
            client_secret,
            scope,
            http,
            timeout,
            buffer_secs,
            cell: TokenCell::new(authority, events),
        }
    }

    async fn exchange(&self) -> GatewayResult<CachedToken> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }
        exchange_token(
            &self.http,
            &self.authority,
            &self.token_endpoint,
            &form,
            self.timeout,
        )
        .await
    }

    pub async fn token(&self) -> GatewayResult<CachedToken> {
        self.cell
            .get_or_refresh(self.buffer_secs, || self.exchange())
            .await
    }
}

#[async_trait]
impl AuthStrategy for ClientCredentialsAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::Oauth2ClientCredentials
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

/// Static key header plus a client-credentials bearer token
pub struct ApiKeyOAuth2Auth {
    key: ApiKeyAuth,
    oauth: ClientCredentialsAuth,
}

impl ApiKeyOAuth2Auth {
    pub fn new(key: ApiKeyAuth, oauth: ClientCredentialsAuth) -> Self {
        Self { key, oauth }
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyOAuth2Auth {
    fn kind(&self) -> AuthKind {
        AuthKind::ApiKeyOauth2
    }

    async fn authenticate(&self, _ctx: &SigningContext<'_>) -> GatewayResult<AuthMaterial> {
        let token = self.oauth.token().await?;
        Ok(self
            .key
            .material()
            .with_header("Authorization", token.authorization_header()))
    }

    async fn refresh(&self) -> GatewayResult<()> {
        self.oauth.refresh().await
    }

    async fn invalidate(&self) {
        self.oauth.invalidate().await;
    }

    fn token_snapshot(&self) -> Option<TokenSnapshot> {
        self.oauth.token_snapshot()
    }
}
