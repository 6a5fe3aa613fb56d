use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid configuration detected at factory or build time, never at
    /// request time.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("failed to decode base64url secret: {0}")]
    SecretDecode(String),
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    ExpiredToken,
    #[error("token audience does not match the expected audience")]
    AudienceMismatch,
    #[error("token issuer does not match the expected issuer")]
    IssuerMismatch,
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("token missing kid header")]
    MissingKeyId,
    #[error("no decoding key available for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to decode token header: {0}")]
    InvalidHeader(String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("key set unavailable: {0}")]
    KeyUnavailable(String),
    #[error("key lookup rate limit exceeded")]
    RateLimited,
    #[error("failed to parse key set response: {0}")]
    JwksDecode(String),
    #[error("key set entry missing key id (kid)")]
    JwksMissingKid,
    #[error("key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
    #[error("key '{kid}' uses unsupported key type '{kty}'")]
    JwksUnsupportedKey { kid: String, kty: String },
    #[error("key '{kid}' uses unsupported alg '{alg}'")]
    JwksUnsupportedAlg { kid: String, alg: String },
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::ExpiredToken,
            ErrorKind::InvalidAudience => Self::AudienceMismatch,
            ErrorKind::InvalidIssuer => Self::IssuerMismatch,
            _ => Self::Verification(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl AuthError {
    /// Stable machine code and status used by both the `IntoResponse` impl
    /// and the unauthorized-request handler.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                (StatusCode::UNAUTHORIZED, "AUTH_HEADER")
            }
            AuthError::MissingKeyId | AuthError::UnknownKeyId(_) => {
                (StatusCode::UNAUTHORIZED, "AUTH_KEY")
            }
            AuthError::InvalidHeader(_)
            | AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::AudienceMismatch
            | AuthError::IssuerMismatch
            | AuthError::Verification(_) => (StatusCode::UNAUTHORIZED, "AUTH_TOKEN"),
            AuthError::InvalidClaim(_, _) | AuthError::InvalidJson(_) => {
                (StatusCode::BAD_REQUEST, "AUTH_CLAIMS")
            }
            AuthError::KeyUnavailable(_) | AuthError::RateLimited => {
                (StatusCode::SERVICE_UNAVAILABLE, "AUTH_KEYS_UNAVAILABLE")
            }
            AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_)
            | AuthError::JwksUnsupportedKey { .. }
            | AuthError::JwksUnsupportedAlg { .. }
            | AuthError::KeyParse(_, _) => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_JWKS"),
            AuthError::Configuration(_) | AuthError::SecretDecode(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_CONFIG")
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
