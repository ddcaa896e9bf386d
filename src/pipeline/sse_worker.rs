//! Subscribes to the remote SSE stream, latches the endpoint announcement,
//! and forwards every other event payload to the output channel.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{ProxyError, ProxyResult};

/// An event payload is the endpoint announcement if it either begins with
/// `/messages/` or mentions `session_id` anywhere in its body.
fn is_endpoint_event(payload: &str) -> bool {
    payload.starts_with("/messages/") || payload.contains("session_id")
}

/// Subscribes to `url` and runs until the stream closes or `cancel` fires.
///
/// A subscribe failure is logged and the worker keeps running (honoring
/// cancellation) rather than returning an error, matching the documented
/// behavior for transient connectivity loss.
pub async fn run(
    http_client: reqwest::Client,
    url: url::Url,
    post_path_tx: mpsc::Sender<String>,
    output_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> ProxyResult<()> {
    let mut endpoint_latched = false;
    let mut backoff = std::time::Duration::from_millis(100);

    loop {
        if cancel.is_cancelled() {
            return Err(ProxyError::Cancelled);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = http_client.get(url.clone()).send() => result,
        };

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "sse subscribe rejected, retrying");
                if sleep_or_cancel(&mut backoff, &cancel).await {
                    return Err(ProxyError::Cancelled);
                }
                continue;
            }
            Err(e) => {
                warn!(error = %e, "sse subscribe failed, retrying");
                if sleep_or_cancel(&mut backoff, &cancel).await {
                    return Err(ProxyError::Cancelled);
                }
                continue;
            }
        };

        backoff = std::time::Duration::from_millis(100);
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                chunk = stream.next() => chunk,
            };

            let Some(chunk) = chunk else {
                debug!("sse stream closed");
                return Ok(());
            };
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer.drain(..pos + 2);

                if let Some(payload) = extract_data(&event) {
                    if is_endpoint_event(&payload) {
                        if endpoint_latched {
                            trace!("dropping duplicate endpoint event");
                            continue;
                        }
                        endpoint_latched = true;
                        if post_path_tx.send(payload).await.is_err() {
                            debug!("post-path channel closed, sse worker shutting down");
                            return Ok(());
                        }
                    } else if output_tx.send(payload).await.is_err() {
                        debug!("output channel closed, sse worker shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Returns `true` if cancellation fired while sleeping.
async fn sleep_or_cancel(backoff: &mut std::time::Duration, cancel: &CancellationToken) -> bool {
    let cancelled = tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(*backoff) => false,
    };
    *backoff = (*backoff * 2).min(std::time::Duration::from_secs(5));
    cancelled
}

/// Joins every `data:` line in an SSE event block into its payload.
fn extract_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:").or_else(|| line.strip_prefix("data: ")))
        .map(str::trim)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
