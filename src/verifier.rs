use std::fmt;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksClient;

enum KeySource {
    Hmac(DecodingKey),
    Remote(JwksClient),
}

/// Verifies bearer tokens against either a shared HMAC secret or remotely
/// fetched public keys. Holds no per-verification mutable state, so a single
/// instance serves any number of concurrent requests.
pub struct JwtVerifier {
    config: JwtConfig,
    source: KeySource,
}

impl JwtVerifier {
    /// HS256 verifier over a shared secret.
    pub fn with_secret(secret: &[u8], config: JwtConfig) -> Self {
        Self {
            config,
            source: KeySource::Hmac(DecodingKey::from_secret(secret)),
        }
    }

    /// RS256 verifier resolving keys through a remote key client.
    pub fn with_remote_keys(client: JwksClient, config: JwtConfig) -> Self {
        Self {
            config,
            source: KeySource::Remote(client),
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn algorithm(&self) -> Algorithm {
        match self.source {
            KeySource::Hmac(_) => Algorithm::HS256,
            KeySource::Remote(_) => Algorithm::RS256,
        }
    }

    pub fn jwks_client(&self) -> Option<&JwksClient> {
        match &self.source {
            KeySource::Hmac(_) => None,
            KeySource::Remote(client) => Some(client),
        }
    }

    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let (key, algorithm) = match &self.source {
            KeySource::Hmac(key) => (key.clone(), Algorithm::HS256),
            KeySource::Remote(client) => {
                let header = decode_header(token)
                    .map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
                let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
                (client.key(&kid).await?, Algorithm::RS256)
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[self.config.issuer()]);
        validation.set_audience(&[self.config.audience()]);
        validation.leeway = self.config.leeway_seconds().into();

        let token_data = decode::<Value>(token, &key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(subject = %claims.subject, "verified bearer token");
        Ok(claims)
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of debug output.
        f.debug_struct("JwtVerifier")
            .field("config", &self.config)
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::Utc;
    use httpmock::prelude::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use serde::Serialize;

    use crate::jwks::JwksClientBuilder;

    #[derive(Serialize)]
    struct TokenClaims<'a> {
        sub: &'a str,
        iss: &'a str,
        aud: &'a str,
        scope: &'a str,
        exp: i64,
        iat: i64,
    }

    fn sign_hs256(secret: &[u8], issuer: &str, audience: &str, exp_offset: i64) -> String {
        let issued_at = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "user-1",
            iss: issuer,
            aud: audience,
            scope: "read:items",
            exp: issued_at + exp_offset,
            iat: issued_at,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .expect("sign token")
    }

    fn verifier(secret: &[u8]) -> JwtVerifier {
        JwtVerifier::with_secret(secret, JwtConfig::new("https://issuer.example", "my-api"))
    }

    #[test]
    fn debug_output_reports_algorithm_not_key_material() {
        let rendered = format!("{:?}", verifier(b"mysecret"));
        assert!(rendered.contains("HS256"));
        assert!(!rendered.contains("mysecret"));
    }

    #[tokio::test]
    async fn accepts_token_signed_with_shared_secret() {
        let token = sign_hs256(b"mysecret", "https://issuer.example", "my-api", 600);
        let claims = verifier(b"mysecret")
            .verify(&token)
            .await
            .expect("verification succeeds");

        assert_eq!(claims.subject, "user-1");
        assert_eq!(claims.issuer, "https://issuer.example");
        assert_eq!(claims.audience, vec!["my-api".to_string()]);
        assert!(claims.has_scope("read:items"));
    }

    #[tokio::test]
    async fn rejects_wrong_audience() {
        let token = sign_hs256(b"mysecret", "https://issuer.example", "other-api", 600);
        let err = verifier(b"mysecret")
            .verify(&token)
            .await
            .expect_err("should reject");
        assert!(matches!(err, AuthError::AudienceMismatch));
    }

    #[tokio::test]
    async fn rejects_wrong_issuer() {
        let token = sign_hs256(b"mysecret", "https://rogue.example", "my-api", 600);
        let err = verifier(b"mysecret")
            .verify(&token)
            .await
            .expect_err("should reject");
        assert!(matches!(err, AuthError::IssuerMismatch));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let token = sign_hs256(b"mysecret", "https://issuer.example", "my-api", -600);
        let err = verifier(b"mysecret")
            .verify(&token)
            .await
            .expect_err("should reject");
        assert!(matches!(err, AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn rejects_token_signed_with_different_secret() {
        let token = sign_hs256(b"not-the-secret", "https://issuer.example", "my-api", 600);
        let err = verifier(b"mysecret")
            .verify(&token)
            .await
            .expect_err("should reject");
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[tokio::test]
    async fn remote_verifier_resolves_key_by_kid() {
        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private pem");
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key");
        let modulus = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let exponent = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/.well-known/jwks.json");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    serde_json::json!({
                        "keys": [{
                            "kid": "rotation-1",
                            "kty": "RSA",
                            "alg": "RS256",
                            "n": modulus,
                            "e": exponent
                        }]
                    })
                    .to_string(),
                );
        });

        let issued_at = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "user-2",
            iss: "https://issuer.example",
            aud: "my-api",
            scope: "",
            exp: issued_at + 600,
            iat: issued_at,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("rotation-1".to_string());
        let token = encode(&header, &claims, &encoding).expect("sign token");

        let client = JwksClientBuilder::new(server.base_url())
            .build()
            .expect("client builds");
        let verifier = JwtVerifier::with_remote_keys(
            client,
            JwtConfig::new("https://issuer.example", "my-api"),
        );

        let verified = verifier.verify(&token).await.expect("verification succeeds");
        assert_eq!(verified.subject, "user-2");

        // kid-less tokens cannot be matched to a remote key
        let bare = encode(&Header::new(Algorithm::RS256), &claims, &encoding).expect("sign token");
        let err = verifier.verify(&bare).await.expect_err("should reject");
        assert!(matches!(err, AuthError::MissingKeyId));
    }
}
