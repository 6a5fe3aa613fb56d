/// Clock skew tolerated when validating `exp`/`nbf`, in seconds.
pub const DEFAULT_LEEWAY_SECONDS: u32 = 30;

/// Immutable verification parameters shared by both signing strategies.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    issuer: String,
    audience: String,
    leeway_seconds: u32,
}

impl JwtConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
        }
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn leeway_seconds(&self) -> u32 {
        self.leeway_seconds
    }
}
