//! Transient local HTTP listener for the OAuth 2.1 callback.
//!
//! The server answers exactly one request on `callback_path`, performs the
//! code-for-token exchange via the caller-supplied `exchange` closure, and
//! shuts itself down shortly after responding (or immediately if `cancel`
//! fires first). Binding `exchange` as a boxed closure rather than storing
//! the OAuth client's own (deeply typestated) type keeps this module
//! decoupled from the specifics of the `oauth2` crate's builder API.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ProxyError, ProxyResult};

/// Exchanges an authorization code for an access token.
pub type ExchangeFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<SecretString, String>> + Send + Sync>;

const SUCCESS_PAGE: &str = "<!doctype html><html><body>\
     <h1>Authentication complete</h1>\
     <p>You can close this window and return to your terminal.</p>\
     </body></html>";

struct CallbackState {
    exchange: ExchangeFn,
    result_tx: Mutex<Option<oneshot::Sender<Result<SecretString, String>>>>,
}

#[derive(serde::Deserialize)]
struct CallbackParams {
    code: Option<String>,
    #[allow(dead_code)]
    state: Option<String>,
}

/// Runs the callback server until it has handled one request (or `cancel`
/// fires), returning the exchanged access token.
pub async fn run(
    listen_port: u16,
    callback_path: &str,
    exchange: ExchangeFn,
    cancel: CancellationToken,
) -> ProxyResult<SecretString> {
    let (result_tx, result_rx) = oneshot::channel();
    let state = Arc::new(CallbackState {
        exchange,
        result_tx: Mutex::new(Some(result_tx)),
    });

    let app = Router::new()
        .route(callback_path, get(handle_callback))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", listen_port))
        .await
        .map_err(ProxyError::Io)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server =
        axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
    let server_handle = tokio::spawn(server);

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = shutdown_tx.send(());
            let _ = server_handle.await;
            Err(ProxyError::Cancelled)
        }
        outcome = result_rx => {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = shutdown_tx.send(());
            let _ = server_handle.await;
            match outcome {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(message)) => Err(ProxyError::token_exchange(message)),
                Err(_) => Err(ProxyError::invalid_callback(
                    "callback server closed before a code was received",
                )),
            }
        }
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let Some(code) = params.code else {
        return (StatusCode::BAD_REQUEST, "missing code parameter").into_response();
    };

    let result = (state.exchange)(code).await;
    let response = match &result {
        Ok(_) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (
                    header::HeaderName::from_static("x-content-type-options"),
                    "nosniff",
                ),
            ],
            Html(SUCCESS_PAGE),
        )
            .into_response(),
        Err(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.clone()).into_response(),
    };

    if let Some(tx) = state.result_tx.lock().await.take() {
        let _ = tx.send(result);
    }

    response
}
