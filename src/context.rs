use axum::http::Extensions;

use crate::claims::Claims;

/// Per-request storage for the authenticated principal. Implementations are
/// keyed on the request's extensions, so nothing survives past the request —
/// this is what keeps the pipeline stateless.
pub trait SecurityContextStrategy: Send + Sync {
    fn store(&self, extensions: &mut Extensions, claims: Claims);
    fn load(&self, extensions: &Extensions) -> Option<Claims>;
    fn clear(&self, extensions: &mut Extensions);
}

/// Default strategy: the verified claims ride along in the request
/// extensions, read-only for downstream handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerSecurityContext;

#[derive(Clone)]
struct StoredPrincipal(Claims);

impl SecurityContextStrategy for BearerSecurityContext {
    fn store(&self, extensions: &mut Extensions, claims: Claims) {
        extensions.insert(StoredPrincipal(claims));
    }

    fn load(&self, extensions: &Extensions) -> Option<Claims> {
        extensions
            .get::<StoredPrincipal>()
            .map(|stored| stored.0.clone())
    }

    fn clear(&self, extensions: &mut Extensions) {
        extensions.remove::<StoredPrincipal>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        Claims::try_from(serde_json::json!({
            "sub": "user-1",
            "iss": "https://issuer.example",
            "aud": "my-api",
            "exp": 4_102_444_800i64
        }))
        .expect("claims parse")
    }

    #[test]
    fn store_load_clear_round_trip() {
        let strategy = BearerSecurityContext;
        let mut extensions = Extensions::new();

        assert!(strategy.load(&extensions).is_none());

        strategy.store(&mut extensions, sample_claims());
        let loaded = strategy.load(&extensions).expect("principal stored");
        assert_eq!(loaded.subject, "user-1");

        strategy.clear(&mut extensions);
        assert!(strategy.load(&extensions).is_none());
    }

    #[test]
    fn fresh_extensions_hold_no_principal() {
        let strategy = BearerSecurityContext;
        assert!(strategy.load(&Extensions::new()).is_none());
    }
}
