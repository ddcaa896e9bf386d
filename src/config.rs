//! Typed, validated configuration assembled once at startup.

use crate::error::{ProxyError, ProxyResult};

/// Transport mode the pipeline operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// SSE-streaming mode: responses arrive over a persistent event stream.
    Sse,
    /// Direct HTTP mode: responses arrive in-line on the POST response body.
    Http,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Sse
    }
}

/// Settings controlling the OAuth 2.1 authorization-code flow and its
/// local callback listener.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Port the local callback server binds to.
    pub listen_port: u16,
    /// Path the callback server listens on.
    pub callback_path: String,
    /// Path appended to the authorization-server base for OIDC discovery.
    pub discovery_path: String,
    /// Maximum authentication attempts permitted within one cooldown window.
    pub max_attempts: u32,
    /// Cooldown window after hitting `max_attempts`.
    pub cooldown: std::time::Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            listen_port: 8181,
            callback_path: "/callback".to_string(),
            discovery_path: "/.well-known/openid-configuration".to_string(),
            max_attempts: 3,
            cooldown: std::time::Duration::from_secs(15),
        }
    }
}

/// Fully validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheme+authority of the remote MCP server, e.g. `http://localhost:8000`.
    pub host: url::Url,
    /// Transport mode.
    pub mode: Mode,
    /// Path used to subscribe to the SSE stream (SSE mode only).
    pub sse_path: String,
    /// Path used for direct-mode POSTs and as the fallback POST target.
    pub mcp_path: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: secrecy::SecretString,
    /// Auth subsystem settings.
    pub auth: AuthSettings,
}

impl Config {
    /// Build and validate a `Config` from raw CLI values.
    pub fn build(
        host: &str,
        mode: Mode,
        sse_path: String,
        mcp_path: String,
        client_id: String,
        client_secret: String,
        auth: AuthSettings,
    ) -> ProxyResult<Self> {
        for (name, path) in [("sse-path", &sse_path), ("mcp-path", &mcp_path)] {
            if !path.starts_with('/') {
                return Err(ProxyError::configuration(format!(
                    "--{name} must start with '/', got {path:?}"
                )));
            }
        }

        let normalized = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let host = url::Url::parse(&normalized)
            .map_err(|e| ProxyError::configuration(format!("invalid --host {normalized:?}: {e}")))?;

        Ok(Self {
            host,
            mode,
            sse_path,
            mcp_path,
            client_id,
            client_secret: secrecy::SecretString::from(client_secret),
            auth,
        })
    }
}
