//! `mcp-stdio-proxy` CLI entry point.

use clap::Parser;

use mcp_stdio_proxy::cli::Cli;
use mcp_stdio_proxy::pipeline::Orchestrator;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli.init_tracing();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let orchestrator = match Orchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let stdin = tokio::io::stdin();
    let stdout = std::io::stdout();

    if let Err(e) = orchestrator.run(stdin, stdout).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
