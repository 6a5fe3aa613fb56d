use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

use crate::config::JwtConfig;
use crate::context::BearerSecurityContext;
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksClientBuilder;
use crate::pipeline::{BearerChallenge, PipelineConfig, PipelineMutation, SessionPolicy};
use crate::rate_limit::RateLimitPolicy;
use crate::verifier::JwtVerifier;

enum Strategy {
    SharedSecret { secret: Vec<u8> },
    Asymmetric { builder: JwksClientBuilder },
}

/// Configures stateless bearer-token authentication for an HTTP pipeline.
///
/// Built through one of the four factories, which choose between shared-secret
/// (HS256) and asymmetric (RS256, remote key set) verification. Factories only
/// capture and validate data; the verifier is built lazily on first use and
/// cached for the life of the configurer.
///
/// `apply` consumes the configurer, so a configurer cannot be applied to two
/// pipelines (or twice to one); build a second configurer instead.
pub struct JwtAuthConfigurer {
    audience: String,
    issuer: String,
    strategy: Strategy,
    verifier: OnceLock<Arc<JwtVerifier>>,
}

impl JwtAuthConfigurer {
    fn new(audience: String, issuer: String, strategy: Strategy) -> AuthResult<Self> {
        if audience.trim().is_empty() {
            return Err(AuthError::Configuration("audience must not be empty".into()));
        }
        if issuer.trim().is_empty() {
            return Err(AuthError::Configuration("issuer must not be empty".into()));
        }
        Ok(Self {
            audience,
            issuer,
            strategy,
            verifier: OnceLock::new(),
        })
    }

    /// Asymmetric (RS256) verification with an unlimited remote key client.
    pub fn for_asymmetric(
        audience: impl Into<String>,
        issuer: impl Into<String>,
    ) -> AuthResult<Self> {
        let issuer = issuer.into();
        let builder = JwksClientBuilder::new(issuer.clone());
        Self::new(audience.into(), issuer, Strategy::Asymmetric { builder })
    }

    /// Asymmetric verification with a token-bucket bound on key fetches:
    /// bursts up to `capacity`, refilling `refill_rate` tokens per `unit`.
    pub fn for_asymmetric_with_rate_limit(
        audience: impl Into<String>,
        issuer: impl Into<String>,
        capacity: u64,
        refill_rate: u64,
        unit: Duration,
    ) -> AuthResult<Self> {
        // Validate before any builder exists.
        let policy = RateLimitPolicy::new(capacity, refill_rate, unit)?;
        let issuer = issuer.into();
        let builder = JwksClientBuilder::new(issuer.clone()).rate_limited(policy);
        Self::new(audience.into(), issuer, Strategy::Asymmetric { builder })
    }

    /// Shared-secret (HS256) verification from raw secret bytes.
    pub fn for_shared_secret(
        audience: impl Into<String>,
        issuer: impl Into<String>,
        secret: impl Into<Vec<u8>>,
    ) -> AuthResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::Configuration(
                "shared secret must not be empty".into(),
            ));
        }
        Self::new(
            audience.into(),
            issuer.into(),
            Strategy::SharedSecret { secret },
        )
    }

    /// Shared-secret verification from a URL-safe base64 string. Padding is
    /// tolerated; anything else that fails to decode is a `SecretDecode`.
    pub fn for_shared_secret_base64(
        audience: impl Into<String>,
        issuer: impl Into<String>,
        encoded: &str,
    ) -> AuthResult<Self> {
        let secret = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|err| AuthError::SecretDecode(err.to_string()))?;
        Self::for_shared_secret(audience, issuer, secret)
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn is_asymmetric(&self) -> bool {
        matches!(self.strategy, Strategy::Asymmetric { .. })
    }

    /// The verifier for this configuration, built on first call and cached.
    /// For the asymmetric strategy this materializes the remote key client
    /// (URL validation, no network I/O); failures surface here, at startup.
    pub fn verifier(&self) -> AuthResult<Arc<JwtVerifier>> {
        if let Some(existing) = self.verifier.get() {
            return Ok(existing.clone());
        }
        let built = Arc::new(self.build_verifier()?);
        Ok(self.verifier.get_or_init(|| built).clone())
    }

    fn build_verifier(&self) -> AuthResult<JwtVerifier> {
        let config = JwtConfig::new(&self.issuer, &self.audience);
        match &self.strategy {
            Strategy::SharedSecret { secret } => {
                debug!(issuer = %self.issuer, audience = %self.audience, alg = "HS256",
                    "built shared-secret verifier");
                Ok(JwtVerifier::with_secret(secret, config))
            }
            Strategy::Asymmetric { builder } => {
                let client = builder.build()?;
                debug!(issuer = %self.issuer, audience = %self.audience, alg = "RS256",
                    jwks_url = client.url(), rate_limited = client.is_rate_limited(),
                    "built remote-key verifier");
                Ok(JwtVerifier::with_remote_keys(client, config))
            }
        }
    }

    /// The ordered mutation sequence `apply` will perform. The order is a
    /// contract: the disables come after the installs so no engine default
    /// can re-enable state behind them.
    pub fn assembly(&self) -> AuthResult<Vec<PipelineMutation>> {
        let verifier = self.verifier()?;
        Ok(vec![
            PipelineMutation::RegisterVerifier(verifier),
            PipelineMutation::InstallContextStrategy(Arc::new(BearerSecurityContext)),
            PipelineMutation::InstallEntryPoint(Arc::new(BearerChallenge)),
            PipelineMutation::DisableHttpBasic,
            PipelineMutation::DisableCsrf,
            PipelineMutation::SetSessionPolicy(SessionPolicy::Stateless),
        ])
    }

    /// Apply the assembly to `pipeline` and hand it back for further
    /// chaining. Consumes the configurer.
    pub fn apply<P: PipelineConfig>(self, mut pipeline: P) -> AuthResult<P> {
        for mutation in self.assembly()? {
            pipeline.apply_mutation(mutation);
        }
        Ok(pipeline)
    }
}

impl fmt::Debug for JwtAuthConfigurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match self.strategy {
            Strategy::SharedSecret { .. } => "shared-secret",
            Strategy::Asymmetric { .. } => "asymmetric",
        };
        // The shared secret must never appear in debug output.
        f.debug_struct("JwtAuthConfigurer")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("strategy", &strategy)
            .finish_non_exhaustive()
    }
}
