//! Serializes every output line to stdout, flushing after each message.

use std::io::Write;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProxyResult;

/// Drains `rx`, writing each line followed by `\n` to `out` and flushing
/// immediately so a line-oriented reader on the other end never blocks.
pub async fn run<W>(
    mut rx: mpsc::Receiver<String>,
    mut out: W,
    cancel: CancellationToken,
) -> ProxyResult<()>
where
    W: Write,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("output proxy cancelled");
                return Ok(());
            }
            line = rx.recv() => match line {
                Some(line) => line,
                None => {
                    debug!("output channel closed, output proxy shutting down");
                    return Ok(());
                }
            },
        };

        writeln!(out, "{line}")?;
        out.flush()?;
    }
}
