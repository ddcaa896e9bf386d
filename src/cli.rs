//! Command-line interface and logging initialization.

use clap::Parser;

use crate::config::{AuthSettings, Config, Mode};
use crate::error::ProxyResult;

/// Local stdio<->HTTP/SSE proxy for the Model Context Protocol.
#[derive(Debug, Parser)]
#[command(name = "mcp-stdio-proxy", version, about)]
pub struct Cli {
    /// Remote MCP server base, e.g. `localhost:8000` or `https://mcp.example.com`.
    #[arg(long, default_value = "localhost:8000")]
    pub host: String,

    /// Transport mode.
    #[arg(long, value_enum, default_value_t = Mode::Sse)]
    pub mode: Mode,

    /// Path appended to the host for the SSE stream.
    #[arg(long, default_value = "/sse")]
    pub sse_path: String,

    /// Path used for direct-mode POSTs.
    #[arg(long, default_value = "/mcp")]
    pub mcp_path: String,

    /// OAuth client id.
    #[arg(long, default_value = "")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, default_value = "")]
    pub client_secret: String,

    /// Port the local OAuth callback server binds to.
    #[arg(long, default_value_t = 8181)]
    pub auth_listen_port: u16,

    /// Verbose logging; repeat for more detail (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug-level logging (equivalent to `-v`).
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Initialize the `tracing` subscriber according to `--debug`/`-v`.
    pub fn init_tracing(&self) {
        let level = match (self.debug, self.verbose) {
            (_, v) if v >= 2 => tracing::Level::TRACE,
            (true, _) | (_, 1) => tracing::Level::DEBUG,
            _ => tracing::Level::INFO,
        };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Convert the parsed flags into a validated [`Config`].
    pub fn into_config(self) -> ProxyResult<Config> {
        Config::build(
            &self.host,
            self.mode,
            self.sse_path,
            self.mcp_path,
            self.client_id,
            self.client_secret,
            AuthSettings {
                listen_port: self.auth_listen_port,
                ..AuthSettings::default()
            },
        )
    }
}
