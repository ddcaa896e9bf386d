//! ID token verification against a provider's published JWKS.
//!
//! Grounded on `crates/turbomcp-auth/src/jwt/{jwks,validator}.rs`'s
//! JWKS-fetch-then-`jsonwebtoken::decode` shape, scoped down to what an
//! OAuth *client* needs: one fetch per process (cached like OIDC discovery,
//! not TTL-refreshed), no JWKS refresh-on-rotation handling, since this
//! proxy verifies at most a handful of ID tokens over its lifetime rather
//! than serving as a resource server under sustained load.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::OnceCell;

use crate::error::{ProxyError, ProxyResult};

const ALLOWED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::ES256, Algorithm::PS256];

/// Verifies ID tokens issued by one authorization server against its JWKS.
pub struct IdTokenVerifier {
    jwks_uri: String,
    issuer: String,
    audience: String,
    http_client: reqwest::Client,
    jwks: OnceCell<JwkSet>,
}

impl IdTokenVerifier {
    pub fn new(jwks_uri: String, issuer: String, audience: String, http_client: reqwest::Client) -> Self {
        Self {
            jwks_uri,
            issuer,
            audience,
            http_client,
            jwks: OnceCell::new(),
        }
    }

    async fn jwks(&self) -> ProxyResult<&JwkSet> {
        self.jwks
            .get_or_try_init(|| async {
                let response = self
                    .http_client
                    .get(&self.jwks_uri)
                    .send()
                    .await
                    .map_err(|e| ProxyError::token_exchange(format!("jwks fetch failed: {e}")))?;

                if !response.status().is_success() {
                    return Err(ProxyError::token_exchange(format!(
                        "jwks endpoint {} returned status {}",
                        self.jwks_uri,
                        response.status()
                    )));
                }

                response
                    .json::<JwkSet>()
                    .await
                    .map_err(|e| ProxyError::token_exchange(format!("invalid jwks document: {e}")))
            })
            .await
    }

    /// Verifies `id_token`'s signature against the cached JWKS, and its
    /// `iss`/`aud`/`exp` claims against this server's issuer and the OAuth
    /// client id, with a 60 second clock-skew allowance.
    pub async fn verify(&self, id_token: &str) -> ProxyResult<()> {
        let header = decode_header(id_token)
            .map_err(|e| ProxyError::token_exchange(format!("malformed id token header: {e}")))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(ProxyError::token_exchange(format!(
                "id token uses unsupported algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| ProxyError::token_exchange("id token header is missing a key id"))?;

        let jwks = self.jwks().await?;
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| ProxyError::token_exchange(format!("no jwks key found for kid {kid}")))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| ProxyError::token_exchange(format!("unusable jwk for kid {kid}: {e}")))?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 60;

        decode::<serde_json::Value>(id_token, &key, &validation)
            .map(|_| ())
            .map_err(|e| ProxyError::token_exchange(format!("id token validation failed: {e}")))
    }
}
