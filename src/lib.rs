pub mod claims;
pub mod config;
pub mod configurer;
pub mod context;
pub mod error;
pub mod extractors;
pub mod jwks;
pub mod pipeline;
pub mod rate_limit;
pub mod verifier;

pub use claims::Claims;
pub use config::JwtConfig;
pub use configurer::JwtAuthConfigurer;
pub use context::{BearerSecurityContext, SecurityContextStrategy};
pub use error::{AuthError, AuthResult};
pub use extractors::AuthContext;
pub use jwks::{JwksClient, JwksClientBuilder};
pub use pipeline::{
    AuthPipeline, BearerChallenge, MutationKind, PipelineConfig, PipelineMutation, SessionPolicy,
    UnauthorizedHandler,
};
pub use rate_limit::{RateLimitPolicy, TokenBucket};
pub use verifier::JwtVerifier;
