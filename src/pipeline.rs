use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::context::SecurityContextStrategy;
use crate::error::AuthError;
use crate::verifier::JwtVerifier;

/// Session-creation policy for the configured pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Create a session only when something asks for one.
    #[default]
    IfRequired,
    /// Never create a session, but use one if it already exists.
    Never,
    /// Never create nor consult a session; every request authenticates
    /// itself from its own bearer token.
    Stateless,
}

/// Writes the rejection response when authentication fails or is absent.
pub trait UnauthorizedHandler: Send + Sync {
    fn challenge(&self, error: &AuthError) -> Response;
}

/// RFC 6750 bearer challenge: 401 with a `WWW-Authenticate: Bearer` header
/// and a machine-readable JSON body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerChallenge;

impl UnauthorizedHandler for BearerChallenge {
    fn challenge(&self, error: &AuthError) -> Response {
        let (status, code) = error.status_and_code();
        let body = Json(serde_json::json!({
            "code": code,
            "message": error.to_string(),
        }));

        if status == StatusCode::UNAUTHORIZED {
            let params = if matches!(error, AuthError::MissingAuthorization) {
                "Bearer"
            } else {
                "Bearer error=\"invalid_token\""
            };
            (status, [(header::WWW_AUTHENTICATE, params)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// One step of pipeline assembly. The configurer emits these in a fixed
/// order so the sequence itself is an observable contract.
pub enum PipelineMutation {
    RegisterVerifier(Arc<JwtVerifier>),
    InstallContextStrategy(Arc<dyn SecurityContextStrategy>),
    InstallEntryPoint(Arc<dyn UnauthorizedHandler>),
    DisableHttpBasic,
    DisableCsrf,
    SetSessionPolicy(SessionPolicy),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    RegisterVerifier,
    InstallContextStrategy,
    InstallEntryPoint,
    DisableHttpBasic,
    DisableCsrf,
    SetSessionPolicy,
}

impl PipelineMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            PipelineMutation::RegisterVerifier(_) => MutationKind::RegisterVerifier,
            PipelineMutation::InstallContextStrategy(_) => MutationKind::InstallContextStrategy,
            PipelineMutation::InstallEntryPoint(_) => MutationKind::InstallEntryPoint,
            PipelineMutation::DisableHttpBasic => MutationKind::DisableHttpBasic,
            PipelineMutation::DisableCsrf => MutationKind::DisableCsrf,
            PipelineMutation::SetSessionPolicy(_) => MutationKind::SetSessionPolicy,
        }
    }
}

/// The order every assembly follows. Later disables must not be overridden
/// by earlier defaults, so the sequence is fixed rather than caller-chosen.
pub const ASSEMBLY_ORDER: [MutationKind; 6] = [
    MutationKind::RegisterVerifier,
    MutationKind::InstallContextStrategy,
    MutationKind::InstallEntryPoint,
    MutationKind::DisableHttpBasic,
    MutationKind::DisableCsrf,
    MutationKind::SetSessionPolicy,
];

/// Mutation surface of a pipeline-configuration object. Methods return
/// `&mut Self` so configuration reads as a chain.
pub trait PipelineConfig {
    fn register_verifier(&mut self, verifier: Arc<JwtVerifier>) -> &mut Self;
    fn install_context_strategy(&mut self, strategy: Arc<dyn SecurityContextStrategy>)
        -> &mut Self;
    fn install_entry_point(&mut self, handler: Arc<dyn UnauthorizedHandler>) -> &mut Self;
    fn disable_http_basic(&mut self) -> &mut Self;
    fn disable_csrf(&mut self) -> &mut Self;
    fn set_session_policy(&mut self, policy: SessionPolicy) -> &mut Self;

    fn apply_mutation(&mut self, mutation: PipelineMutation) -> &mut Self
    where
        Self: Sized,
    {
        match mutation {
            PipelineMutation::RegisterVerifier(verifier) => self.register_verifier(verifier),
            PipelineMutation::InstallContextStrategy(strategy) => {
                self.install_context_strategy(strategy)
            }
            PipelineMutation::InstallEntryPoint(handler) => self.install_entry_point(handler),
            PipelineMutation::DisableHttpBasic => self.disable_http_basic(),
            PipelineMutation::DisableCsrf => self.disable_csrf(),
            PipelineMutation::SetSessionPolicy(policy) => self.set_session_policy(policy),
        }
    }
}

/// Concrete pipeline settings object. Starts with the engine defaults
/// (basic auth and CSRF on, sessions if required) and records what the
/// configurer applied, for callers to wire into their HTTP stack.
pub struct AuthPipeline {
    verifier: Option<Arc<JwtVerifier>>,
    context_strategy: Option<Arc<dyn SecurityContextStrategy>>,
    entry_point: Option<Arc<dyn UnauthorizedHandler>>,
    http_basic_enabled: bool,
    csrf_enabled: bool,
    session_policy: SessionPolicy,
}

impl Default for AuthPipeline {
    fn default() -> Self {
        Self {
            verifier: None,
            context_strategy: None,
            entry_point: None,
            http_basic_enabled: true,
            csrf_enabled: true,
            session_policy: SessionPolicy::default(),
        }
    }
}

impl AuthPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verifier(&self) -> Option<&Arc<JwtVerifier>> {
        self.verifier.as_ref()
    }

    pub fn context_strategy(&self) -> Option<&Arc<dyn SecurityContextStrategy>> {
        self.context_strategy.as_ref()
    }

    pub fn entry_point(&self) -> Option<&Arc<dyn UnauthorizedHandler>> {
        self.entry_point.as_ref()
    }

    pub fn http_basic_enabled(&self) -> bool {
        self.http_basic_enabled
    }

    pub fn csrf_enabled(&self) -> bool {
        self.csrf_enabled
    }

    pub fn session_policy(&self) -> SessionPolicy {
        self.session_policy
    }
}

impl PipelineConfig for AuthPipeline {
    fn register_verifier(&mut self, verifier: Arc<JwtVerifier>) -> &mut Self {
        self.verifier = Some(verifier);
        self
    }

    fn install_context_strategy(
        &mut self,
        strategy: Arc<dyn SecurityContextStrategy>,
    ) -> &mut Self {
        self.context_strategy = Some(strategy);
        self
    }

    fn install_entry_point(&mut self, handler: Arc<dyn UnauthorizedHandler>) -> &mut Self {
        self.entry_point = Some(handler);
        self
    }

    fn disable_http_basic(&mut self) -> &mut Self {
        self.http_basic_enabled = false;
        self
    }

    fn disable_csrf(&mut self) -> &mut Self {
        self.csrf_enabled = false;
        self
    }

    fn set_session_policy(&mut self, policy: SessionPolicy) -> &mut Self {
        self.session_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults_match_engine_defaults() {
        let pipeline = AuthPipeline::new();
        assert!(pipeline.verifier().is_none());
        assert!(pipeline.context_strategy().is_none());
        assert!(pipeline.entry_point().is_none());
        assert!(pipeline.http_basic_enabled());
        assert!(pipeline.csrf_enabled());
        assert_eq!(pipeline.session_policy(), SessionPolicy::IfRequired);
    }

    #[test]
    fn mutations_flip_the_recorded_state() {
        let mut pipeline = AuthPipeline::new();
        pipeline
            .disable_http_basic()
            .disable_csrf()
            .set_session_policy(SessionPolicy::Stateless);

        assert!(!pipeline.http_basic_enabled());
        assert!(!pipeline.csrf_enabled());
        assert_eq!(pipeline.session_policy(), SessionPolicy::Stateless);
    }

    #[test]
    fn assembly_order_ends_with_the_disables() {
        assert_eq!(ASSEMBLY_ORDER[0], MutationKind::RegisterVerifier);
        assert_eq!(
            &ASSEMBLY_ORDER[3..],
            &[
                MutationKind::DisableHttpBasic,
                MutationKind::DisableCsrf,
                MutationKind::SetSessionPolicy,
            ]
        );
    }

    #[test]
    fn bearer_challenge_sets_www_authenticate() {
        let response = BearerChallenge.challenge(&AuthError::ExpiredToken);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let value = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .expect("challenge header present");
        assert_eq!(value, "Bearer error=\"invalid_token\"");
    }

    #[test]
    fn missing_credentials_get_a_bare_challenge() {
        let response = BearerChallenge.challenge(&AuthError::MissingAuthorization);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let value = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .expect("challenge header present");
        assert_eq!(value, "Bearer");
    }

    #[test]
    fn unavailable_keys_do_not_challenge() {
        let response = BearerChallenge.challenge(&AuthError::RateLimited);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
