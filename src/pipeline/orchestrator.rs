//! Wires the workers together and runs them to completion.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::auth::AuthManager;
use crate::config::{Config, Mode};
use crate::error::{ProxyError, ProxyResult};

use super::{file_reader, http_post_sender, output_proxy, sse_worker};

/// Channel capacity for `stdinToPost` and `stdoutChan`.
const MESSAGE_CHANNEL_CAPACITY: usize = 1000;
/// Channel capacity for `postPathChan`: exactly one value is ever delivered.
const POST_PATH_CHANNEL_CAPACITY: usize = 1;

/// Owns the wiring between workers and runs the pipeline to completion.
pub struct Orchestrator {
    config: Config,
    http_client: reqwest::Client,
    auth: Arc<AuthManager>,
}

impl Orchestrator {
    /// Builds an orchestrator for `config`.
    pub fn new(config: Config) -> ProxyResult<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(std::time::Duration::from_secs(90)))
            .build()?;

        let auth = Arc::new(AuthManager::new(
            config.auth.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            http_client.clone(),
        ));

        Ok(Self {
            config,
            http_client,
            auth,
        })
    }

    /// Runs stdin-to-stdout with `input`/`output` as the proxy's endpoints
    /// until EOF, a fatal error, or cancellation.
    pub async fn run<R, W>(self, input: R, output: W) -> ProxyResult<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: std::io::Write + Send + 'static,
    {
        let cancel = CancellationToken::new();

        let (stdin_tx, stdin_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (stdout_tx, stdout_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (post_path_tx, post_path_rx) = mpsc::channel(POST_PATH_CHANNEL_CAPACITY);

        if self.config.mode == Mode::Http {
            // No SSE worker will ever publish an endpoint in direct mode, so
            // the configured MCP path is latched up front.
            post_path_tx
                .send(self.config.mcp_path.clone())
                .await
                .map_err(|_| ProxyError::configuration("failed to seed direct-mode post path"))?;
        }

        let sigint_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to install ctrl-c handler");
                return;
            }
            tracing::info!("ctrl-c received, shutting down");
            sigint_cancel.cancel();
        });

        let mut handles = Vec::new();

        handles.push(tokio::spawn(file_reader::run(
            input,
            stdin_tx,
            cancel.clone(),
        )));

        handles.push(tokio::spawn(http_post_sender::run(
            self.http_client.clone(),
            self.config.host.clone(),
            post_path_rx,
            stdin_rx,
            stdout_tx.clone(),
            self.auth.clone(),
            cancel.clone(),
        )));

        if self.config.mode == Mode::Sse {
            let sse_url = self
                .config
                .host
                .join(&self.config.sse_path)
                .map_err(|e| ProxyError::invalid_endpoint(e.to_string()))?;
            handles.push(tokio::spawn(sse_worker::run(
                self.http_client.clone(),
                sse_url,
                post_path_tx,
                stdout_tx,
                cancel.clone(),
            )));
        } else {
            drop(post_path_tx);
        }

        handles.push(tokio::spawn(output_proxy::run(
            stdout_rx,
            output,
            cancel.clone(),
        )));

        let mut first_error = None;
        let mut remaining = handles;

        while !remaining.is_empty() {
            let (result, _index, rest) = futures_util::future::select_all(remaining).await;
            remaining = rest;
            // The first worker to finish (cleanly or not) triggers shutdown
            // of the rest, which are all cancellation-aware.
            cancel.cancel();

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "worker exited with error");
                    if e.is_fatal() && first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_error) => {
                    error!(error = %join_error, "worker task panicked");
                }
            }
        }

        info!("pipeline shut down");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
