use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use cinema_core::identity::{Claims, TokenVerifier};
use cinema_core::{CoreError, CoreResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Identity provider token layout
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RoleSet {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Access token as issued by a Keycloak-style realm.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessTokenClaims {
    pub sub: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub realm_access: Option<RoleSet>,
    #[serde(default)]
    pub resource_access: HashMap<String, RoleSet>,
}

impl AccessTokenClaims {
    /// Realm roles plus the roles granted on `client_id`.
    pub fn into_claims(self, client_id: Option<&str>) -> CoreResult<Claims> {
        let subject = self
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Unauthenticated("Invalid token payload (no sub)".to_string()))?;

        let mut roles: Vec<String> = self.realm_access.map(|r| r.roles).unwrap_or_default();
        if let Some(client) = client_id.and_then(|id| self.resource_access.get(id)) {
            roles.extend(client.roles.iter().cloned());
        }
        Ok(Claims::new(subject, roles))
    }
}

// ============================================================================
// JWT verifier
// ============================================================================

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    client_id: Option<String>,
}

impl JwtVerifier {
    pub fn hs256(secret: &[u8], client_id: Option<String>) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256, client_id)
    }

    pub fn rs256(public_key_pem: &str, client_id: Option<String>) -> Result<Self, jsonwebtoken::errors::Error> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())?;
        Ok(Self::with_key(key, Algorithm::RS256, client_id))
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm, client_id: Option<String>) -> Self {
        let mut validation = Validation::new(algorithm);
        // Realm tokens carry `aud: account`, not this service.
        validation.validate_aud = false;
        Self {
            key,
            validation,
            client_id,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> CoreResult<Claims> {
        let data = decode::<AccessTokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| CoreError::Unauthenticated(format!("Invalid token: {}", e)))?;
        data.claims.into_claims(self.client_id.as_deref())
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Verifies the bearer token and injects [`Claims`] into request extensions.
/// Role checks are left to the operation being called.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract bearer token
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| CoreError::Unauthenticated("Missing bearer token".to_string()))?;

    // 2. Verify
    let claims = state.verifier.verify(bearer.token()).await?;

    // 3. Inject claims
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
