use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::claims::Claims;
use crate::context::{BearerSecurityContext, SecurityContextStrategy};
use crate::error::{AuthError, AuthResult};
use crate::verifier::JwtVerifier;

/// Verified bearer principal for the current request.
///
/// If the security-context strategy already stored a principal (an upstream
/// layer verified the token), that principal is reused; otherwise the token
/// is verified here and stored for downstream consumers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims.has_scope(scope)
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;
        let token = bearer_token(header_value)?;

        let strategy = BearerSecurityContext;
        let claims = match strategy.load(&parts.extensions) {
            Some(claims) => claims,
            None => {
                let verifier = Arc::<JwtVerifier>::from_ref(state);
                let claims = verifier.verify(&token).await?;
                strategy.store(&mut parts.extensions, claims.clone());
                claims
            }
        };

        Ok(Self { claims, token })
    }
}

fn bearer_token(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
