//! Posts each outgoing line to the discovered (or configured) endpoint and
//! dispatches the response, invoking the [`AuthManager`] on 401/403.

use std::sync::Arc;

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::auth::AuthManager;
use crate::error::{ProxyError, ProxyResult};
use crate::jsonrpc;

/// Runs the POST-sender worker until `input_rx` closes or `cancel` fires.
///
/// Blocks first on `post_path_rx` (capacity 1 — delivered exactly once by
/// the SSE worker, or pre-filled with the configured direct-mode path) to
/// learn where to POST, then forwards every line from `input_rx`.
pub async fn run(
    http_client: reqwest::Client,
    host: url::Url,
    mut post_path_rx: mpsc::Receiver<String>,
    mut input_rx: mpsc::Receiver<String>,
    output_tx: mpsc::Sender<String>,
    auth: Arc<AuthManager>,
    cancel: CancellationToken,
) -> ProxyResult<()> {
    let path = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
        path = post_path_rx.recv() => path.ok_or(ProxyError::Cancelled)?,
    };

    let endpoint = host
        .join(&path)
        .map_err(|e| ProxyError::invalid_endpoint(format!("{host} + {path}: {e}")))?;
    debug!(%endpoint, "post sender resolved endpoint");

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            line = input_rx.recv() => match line {
                Some(line) => line,
                None => {
                    debug!("input channel closed, post sender shutting down");
                    return Ok(());
                }
            },
        };

        if let Err(e) = send_one(&http_client, &endpoint, &line, &auth, &output_tx, &cancel).await
        {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(error = %e, "post sender: request failed, continuing");
        }
    }
}

async fn send_one(
    http_client: &reqwest::Client,
    endpoint: &url::Url,
    line: &str,
    auth: &Arc<AuthManager>,
    output_tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> ProxyResult<()> {
    let mut request = http_client
        .post(endpoint.clone())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(line.to_string());

    let token_attached = auth.current_token();
    if let Some(token) = &token_attached {
        request = request.bearer_auth(token.expose_secret());
    }

    let response = request.send().await?;
    let status = response.status();
    trace!(%status, "post sender received response");

    match status {
        StatusCode::OK => {
            if token_attached.is_some() {
                auth.reset_on_success();
            }
            let body = response.text().await?;
            if output_tx.send(body).await.is_err() {
                debug!("output channel closed while delivering 200 body");
            }
        }
        StatusCode::ACCEPTED => {
            // The real reply arrives asynchronously via SSE (or not at all
            // in direct-HTTP mode, which is a documented no-op here).
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let www_authenticate = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match auth
                .handle_challenge(endpoint, www_authenticate.as_deref(), cancel.clone())
                .await
            {
                Ok(auth_url) => {
                    let id = jsonrpc::extract_id(line);
                    let challenge = jsonrpc::synthesize_auth_challenge(id, &auth_url);
                    if output_tx.send(challenge).await.is_err() {
                        debug!("output channel closed while delivering auth challenge");
                    }
                }
                Err(ProxyError::AdmissionDenied { retry_after }) => {
                    warn!(?retry_after, "authentication attempt denied by admission control");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "failed to initiate authentication"),
            }
        }
        other => {
            warn!(status = %other, "unrecognized response status, dropping");
        }
    }

    Ok(())
}
