use async_trait::async_trait;
use certgate_core::{AuthKind, GatewayResult, Secret};

use super::{AuthMaterial, AuthStrategy, SigningContext};

/// Static key sent in a configured header
pub struct ApiKeyAuth {
    header: String,
    key: Secret,
}

impl ApiKeyAuth {
    pub fn new(header: impl Into<String>, key: Secret) -> Self {
        Self {
            header: header.into(),
            key,
        }
    }

    pub(crate) fn material(&self) -> AuthMaterial {
        AuthMaterial::header(self.header.clone(), self.key.expose())
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::ApiKey
    }

    async fn authenticate(&self, _ctx: &SigningContext<'_>) -> GatewayResult<AuthMaterial> {
        Ok(self.material())
    }
}
