//! giftvault: gift ownership reconciliation cache.
//! Single-process binary running the update stream, the reconciliation
//! poller and the status socket in-process.

use clap::Parser;

mod ack;
mod cli;
mod client;
mod daemon;
mod pump;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("GIFTVAULT_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("giftvault daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status(opts) => {
            client::cmd_status(&socket_path, opts.json).await?;
        }
        cli::Command::Gifts(opts) => {
            client::cmd_gifts(&socket_path, opts.owner.as_deref(), opts.output.json).await?;
        }
    }

    Ok(())
}
