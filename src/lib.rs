//! A local stdio proxy that bridges a line-delimited JSON-RPC client to a
//! remote Model Context Protocol server over HTTP, in either SSE-streaming
//! or direct-HTTP transport mode, transparently handling OAuth 2.1
//! authorization-code challenges along the way.
//!
//! ```text
//!   stdin ──► FileReader ──stdinToPost──► HttpPostSender ──► stdoutChan ──► OutputProxy ──► stdout
//!                                              ▲                │
//!                                postPathChan  │                └──(401/403)──► AuthManager
//!                                              │                                    │
//!                           SseWorker ◄────────┘                              local callback
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod pipeline;

pub use error::{ProxyError, ProxyResult};

/// Crate version, as reported in `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
