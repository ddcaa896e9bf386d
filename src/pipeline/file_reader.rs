//! Reads stdin line-by-line and publishes each line onto `stdinToPost`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ProxyError, ProxyResult};

/// Matches `MAX_REQUEST_SIZE` used elsewhere in the stack; guards against an
/// unbounded line accumulating in memory if the client never sends a
/// newline.
const MAX_LINE_SIZE: usize = 10 * 1024 * 1024;

/// Reads lines from `input` until EOF, error, or cancellation, forwarding
/// each non-empty line to `tx`.
pub async fn run<R>(
    input: R,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> ProxyResult<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        if cancel.is_cancelled() {
            return Err(ProxyError::Cancelled);
        }

        line.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = reader.read_line(&mut line) => result?,
        };

        if read == 0 {
            debug!("stdin closed, file reader shutting down");
            return Ok(());
        }

        if line.len() > MAX_LINE_SIZE {
            return Err(ProxyError::configuration(format!(
                "input line exceeded {MAX_LINE_SIZE} bytes"
            )));
        }

        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }

        trace!(bytes = trimmed.len(), "read line from stdin");
        if tx.send(trimmed.to_string()).await.is_err() {
            debug!("downstream channel closed, file reader shutting down");
            return Ok(());
        }
    }
}
