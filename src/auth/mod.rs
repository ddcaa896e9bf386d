//! OAuth 2.1 authorization-code flow: admission control, challenge
//! handling, and the access token store shared with [`crate::pipeline`].

pub mod callback;
pub mod discovery;
pub mod jwks;

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope, TokenUrl,
};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AuthSettings;
use crate::error::{ProxyError, ProxyResult};
use discovery::OidcConfig;
use jwks::IdTokenVerifier;

/// The subset of a token-endpoint response this proxy reads. Exchanged
/// manually via `reqwest` rather than through `oauth2`'s typed client so the
/// optional `id_token` field — absent from `oauth2::basic::BasicTokenResponse`
/// — is reachable for verification.
#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    id_token: Option<String>,
}

/// Tracks authentication-attempt admission: at most `max_attempts` denied
/// attempts are permitted inside one `cooldown` window, after which the
/// counter resets. A successful token exchange also resets it immediately.
struct AttemptsLedger {
    attempts: u32,
    last_attempt: Option<Instant>,
}

impl AttemptsLedger {
    fn new() -> Self {
        Self {
            attempts: 0,
            last_attempt: None,
        }
    }
}

/// Coordinates the admission check, OIDC discovery, the OAuth
/// authorization-code exchange, and the local callback listener.
pub struct AuthManager {
    settings: AuthSettings,
    client_id: String,
    client_secret: SecretString,
    http_client: reqwest::Client,
    ledger: Mutex<AttemptsLedger>,
    token: Arc<RwLock<Option<SecretString>>>,
    /// OIDC discovery is fetched lazily on the first challenge and held for
    /// the rest of the process's lifetime, per the documented lifetime of
    /// the OIDC Configuration entity.
    oidc: OnceCell<OidcConfig>,
}

impl AuthManager {
    /// Build a new manager; no network or listener activity happens until
    /// [`AuthManager::handle_challenge`] is called.
    pub fn new(
        settings: AuthSettings,
        client_id: String,
        client_secret: SecretString,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            client_id,
            client_secret,
            http_client,
            ledger: Mutex::new(AttemptsLedger::new()),
            token: Arc::new(RwLock::new(None)),
            oidc: OnceCell::new(),
        }
    }

    /// Current access token, if authentication has completed.
    pub fn current_token(&self) -> Option<SecretString> {
        self.token.read().clone()
    }

    /// Admission check: permits an attempt if the cooldown has elapsed or
    /// the attempt count is still under the configured maximum.
    fn can_attempt_auth(&self) -> Result<(), Duration> {
        let mut ledger = self.ledger.lock();
        let now = Instant::now();

        if let Some(last) = ledger.last_attempt {
            let elapsed = now.duration_since(last);
            if elapsed >= self.settings.cooldown {
                ledger.attempts = 0;
            } else if ledger.attempts >= self.settings.max_attempts {
                return Err(self.settings.cooldown - elapsed);
            }
        }

        ledger.attempts += 1;
        ledger.last_attempt = Some(now);
        Ok(())
    }

    /// Resets the ledger after a token obtained from this manager has been
    /// used successfully by the caller.
    pub fn reset_on_success(&self) {
        let mut ledger = self.ledger.lock();
        ledger.attempts = 0;
        ledger.last_attempt = None;
    }

    /// Handles a `401`/`403` response: runs the admission check, discovers
    /// the authorization server, starts the local callback listener in the
    /// background, and returns the URL the user should be sent to.
    ///
    /// The token exchange itself completes asynchronously; once it does,
    /// [`AuthManager::current_token`] starts returning `Some`.
    pub async fn handle_challenge(
        self: &Arc<Self>,
        request_url: &url::Url,
        www_authenticate: Option<&str>,
        cancel: CancellationToken,
    ) -> ProxyResult<String> {
        if let Err(retry_after) = self.can_attempt_auth() {
            return Err(ProxyError::AdmissionDenied { retry_after });
        }

        let scopes = parse_scopes(www_authenticate)?;

        let base = {
            let mut base = request_url.clone();
            base.set_path("");
            base.set_query(None);
            base
        };

        let oidc = self
            .oidc
            .get_or_try_init(|| discovery::fetch(&self.http_client, &base, &self.settings.discovery_path))
            .await?
            .clone();

        let redirect_url = format!(
            "http://localhost:{}{}",
            self.settings.listen_port, self.settings.callback_path
        );

        let id_verifier = oidc.jwks_uri.clone().map(|jwks_uri| {
            Arc::new(IdTokenVerifier::new(
                jwks_uri,
                oidc.issuer.clone(),
                self.client_id.clone(),
                self.http_client.clone(),
            ))
        });

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.expose_secret().to_string()))
            .set_auth_uri(
                AuthUrl::new(oidc.authorization_endpoint.clone())
                    .map_err(|e| ProxyError::invalid_endpoint(e.to_string()))?,
            )
            .set_token_uri(
                TokenUrl::new(oidc.token_endpoint.clone())
                    .map_err(|e| ProxyError::invalid_endpoint(e.to_string()))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url.clone())
                    .map_err(|e| ProxyError::invalid_endpoint(e.to_string()))?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = random_state();

        let mut auth_request = client
            .authorize_url(move || CsrfToken::new(state.clone()))
            .set_pkce_challenge(pkce_challenge);
        for scope in &scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }
        let (auth_url, _csrf_token) = auth_request.url();

        let http_client = self.http_client.clone();
        let token_store = self.token.clone();
        let listen_port = self.settings.listen_port;
        let callback_path = self.settings.callback_path.clone();
        let token_endpoint = oidc.token_endpoint.clone();
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.clone();
        let code_verifier = pkce_verifier.secret().clone();

        // Exchanged by hand (rather than via `client.exchange_code(...)`) so
        // the token endpoint's raw JSON body, including `id_token`, is
        // reachable; `oauth2::basic::BasicTokenResponse` has no such field.
        let exchange: callback::ExchangeFn = Arc::new(move |code: String| {
            let http_client = http_client.clone();
            let token_endpoint = token_endpoint.clone();
            let client_id = client_id.clone();
            let client_secret = client_secret.clone();
            let redirect_url = redirect_url.clone();
            let code_verifier = code_verifier.clone();
            let id_verifier = id_verifier.clone();
            Box::pin(async move {
                let response = http_client
                    .post(&token_endpoint)
                    .form(&[
                        ("grant_type", "authorization_code"),
                        ("code", code.as_str()),
                        ("redirect_uri", redirect_url.as_str()),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.expose_secret()),
                        ("code_verifier", code_verifier.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;

                if !response.status().is_success() {
                    return Err(format!("token endpoint returned status {}", response.status()));
                }

                let body: TokenEndpointResponse = response.json().await.map_err(|e| e.to_string())?;

                if let Some(id_token) = &body.id_token {
                    if let Some(verifier) = id_verifier.as_deref() {
                        verifier.verify(id_token).await.map_err(|e| e.to_string())?;
                    }
                }

                Ok(SecretString::from(body.access_token))
            })
        });

        tokio::spawn(async move {
            match callback::run(listen_port, &callback_path, exchange, cancel).await {
                Ok(token) => {
                    debug!("oauth callback completed, access token stored");
                    *token_store.write() = Some(token);
                }
                Err(e) => warn!(error = %e, "oauth callback did not complete"),
            }
        });

        Ok(auth_url.to_string())
    }
}

/// Parses `scope="..."` out of a `WWW-Authenticate: Bearer ...` header,
/// defaulting to `{openid, profile, email}` when absent or unparsable.
fn parse_scopes(www_authenticate: Option<&str>) -> ProxyResult<Vec<String>> {
    let default = || vec!["openid".to_string(), "profile".to_string(), "email".to_string()];

    let Some(header) = www_authenticate else {
        return Ok(default());
    };
    if !header.trim_start().starts_with("Bearer") {
        return Err(ProxyError::malformed_challenge(format!(
            "expected a Bearer challenge, got {header:?}"
        )));
    }

    let scopes = header
        .split(',')
        .find_map(|part| part.trim().strip_prefix("scope="))
        .map(|raw| raw.trim_matches('"'))
        .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>());

    Ok(scopes.filter(|s| !s.is_empty()).unwrap_or_else(default))
}

fn random_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
