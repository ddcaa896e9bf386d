//! OIDC discovery document fetching.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ProxyError, ProxyResult};

/// The subset of an OIDC provider metadata document this proxy needs.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// URL the user's browser is sent to in order to authenticate.
    pub authorization_endpoint: String,
    /// URL the proxy posts the authorization code to in exchange for a token.
    pub token_endpoint: String,
    /// Issuer identifier, checked against the `iss` claim of ID tokens.
    pub issuer: String,
    /// JWKS endpoint, used to verify ID tokens returned from the token
    /// endpoint. Not every provider metadata document advertises one;
    /// when absent, ID token verification is skipped.
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

/// Fetches `base.join(discovery_path)` and decodes it as [`OidcConfig`].
///
/// Any non-200 status or JSON decode failure is treated as fatal, per the
/// single-endpoint discovery contract described for the auth challenge
/// handler. There is no RFC 8414 fallback and no response cache here; the
/// caller is expected to call this once per process and hold onto the
/// result.
pub async fn fetch(
    client: &reqwest::Client,
    base: &url::Url,
    discovery_path: &str,
) -> ProxyResult<OidcConfig> {
    let mut url = base.clone();
    url.set_path(discovery_path);

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ProxyError::discovery(format!("request to {url} failed: {e}")))?;

    if response.status() != StatusCode::OK {
        return Err(ProxyError::discovery(format!(
            "{url} returned status {}",
            response.status()
        )));
    }

    response
        .json::<OidcConfig>()
        .await
        .map_err(|e| ProxyError::discovery(format!("invalid discovery document from {url}: {e}")))
}
