mod config;
mod error;

use clap::Parser;
use config::Cli;

mod cmd;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cmd::run(cli).await {
        match e.kind() {
            Some(kind) => eprintln!("Error [{kind}]: {e}"),
            None => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}
