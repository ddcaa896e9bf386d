//! The four-worker pipeline: `FileReader -> HttpPostSender <-> SseWorker -> OutputProxy`,
//! wired by bounded channels and joined under a shared cancellation token.

pub mod file_reader;
pub mod http_post_sender;
pub mod orchestrator;
pub mod output_proxy;
pub mod sse_worker;

pub use orchestrator::Orchestrator;
