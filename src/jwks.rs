use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use jsonwebtoken::DecodingKey;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::rate_limit::{RateLimitPolicy, TokenBucket};

const WELL_KNOWN_JWKS_PATH: &str = ".well-known/jwks.json";

/// Deferred construction of a [`JwksClient`]: pure data capture until
/// `build`, which validates the issuer URL but performs no network I/O.
#[derive(Debug, Clone)]
pub struct JwksClientBuilder {
    issuer: String,
    rate_limit: Option<RateLimitPolicy>,
}

impl JwksClientBuilder {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            rate_limit: None,
        }
    }

    /// Bound the aggregate rate of outbound key fetches. A limit can be set
    /// at most once per builder; a second call is a caller bug.
    pub fn rate_limited(mut self, policy: RateLimitPolicy) -> Self {
        debug_assert!(
            self.rate_limit.is_none(),
            "rate limit already configured for this builder"
        );
        self.rate_limit = Some(policy);
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn rate_limit(&self) -> Option<RateLimitPolicy> {
        self.rate_limit
    }

    pub fn build(&self) -> AuthResult<JwksClient> {
        let base = Url::parse(&self.issuer).map_err(|err| {
            AuthError::Configuration(format!("invalid issuer URL '{}': {err}", self.issuer))
        })?;
        let url = format!(
            "{}/{WELL_KNOWN_JWKS_PATH}",
            base.as_str().trim_end_matches('/')
        );

        Ok(JwksClient {
            client: Client::new(),
            url,
            cache: KeyCache::default(),
            gates: Arc::new(Mutex::new(HashMap::new())),
            limiter: self.rate_limit.map(|policy| Arc::new(TokenBucket::new(policy))),
        })
    }
}

/// Thread-safe cache of decoding keys keyed by kid. Reads never block other
/// readers; population happens under the per-kid fetch gate.
#[derive(Clone, Default)]
struct KeyCache {
    inner: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl KeyCache {
    fn get(&self, kid: &str) -> Option<DecodingKey> {
        let guard = self.inner.read().expect("key cache rwlock poisoned");
        guard.get(kid).cloned()
    }

    fn contains(&self, kid: &str) -> bool {
        let guard = self.inner.read().expect("key cache rwlock poisoned");
        guard.contains_key(kid)
    }

    fn insert_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DecodingKey)>,
    {
        let mut guard = self.inner.write().expect("key cache rwlock poisoned");
        for (kid, key) in entries.into_iter() {
            guard.insert(kid, key);
        }
    }
}

/// Remote key client for the asymmetric strategy. Keys are fetched lazily on
/// first lookup of a kid, with at most one in-flight fetch per kid and an
/// optional token-bucket bound on outbound calls.
#[derive(Clone)]
pub struct JwksClient {
    client: Client,
    url: String,
    cache: KeyCache,
    gates: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    limiter: Option<Arc<TokenBucket>>,
}

impl JwksClient {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_rate_limited(&self) -> bool {
        self.limiter.is_some()
    }

    /// Whether a decoding key for `kid` is already cached.
    pub fn has_cached_key(&self, kid: &str) -> bool {
        self.cache.contains(kid)
    }

    /// Resolve the decoding key for `kid`, fetching the key set on a cache
    /// miss. Concurrent misses for the same kid coalesce into one fetch.
    pub async fn key(&self, kid: &str) -> AuthResult<DecodingKey> {
        if let Some(key) = self.cache.get(kid) {
            return Ok(key);
        }

        let gate = self.gate_for(kid);
        let _held = gate.lock().await;

        // Another task may have populated the cache while we waited.
        if let Some(key) = self.cache.get(kid) {
            return Ok(key);
        }

        if let Some(limiter) = &self.limiter {
            if !limiter.try_acquire() {
                return Err(AuthError::RateLimited);
            }
        }

        let keys = self.fetch().await?;
        let count = keys.len();
        self.cache.insert_all(keys);
        debug!(count, kid, url = %self.url, "refreshed key cache from JWKS endpoint");

        self.cache
            .get(kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.to_owned()))
    }

    fn gate_for(&self, kid: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().expect("fetch gate mutex poisoned");
        gates
            .entry(kid.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn fetch(&self) -> AuthResult<Vec<(String, DecodingKey)>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::KeyUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::JwksDecode(err.to_string()))?;

        let mut keys = Vec::new();
        for key in body.keys.into_iter() {
            let kid = key.kid.ok_or(AuthError::JwksMissingKid)?;
            let kty = key.kty.unwrap_or_else(|| "RSA".to_string());
            if kty != "RSA" {
                return Err(AuthError::JwksUnsupportedKey { kid, kty });
            }

            if let Some(alg) = key.alg {
                if alg != "RS256" {
                    return Err(AuthError::JwksUnsupportedAlg { kid, alg });
                }
            }

            let modulus = key
                .n
                .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;
            let exponent = key
                .e
                .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;

            let decoding_key = DecodingKey::from_rsa_components(&modulus, &exponent)
                .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
            keys.push((kid, decoding_key));
        }

        Ok(keys)
    }
}

impl fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksClient")
            .field("url", &self.url)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}
