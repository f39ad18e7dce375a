use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

use cuels::{asg::builtins, check::check, server::Backend};

#[derive(Parser)]
#[command(name = "cuels", version, about = "Language server for CUE")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the language server protocol over stdio (the default)
    Serve,
    /// Compile the package at PATH and print its diagnostics as JSON
    Check { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    builtins::init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();

            let (service, socket) = LspService::new(Backend::new);
            Server::new(stdin, stdout, socket).serve(service).await;
        }
        Command::Check { path } => {
            let diagnostics = check(&path)?;
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        }
    }

    Ok(())
}
