//! Cortex ACP echo agent - speaks ACP over stdio.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use cortex_acp::{AcpSession, EchoAgent, Role, SessionConfig, StreamTransport, logging};

/// Cortex ACP echo agent
#[derive(Parser)]
#[command(name = "cortex-acp-echo")]
#[command(about = "ACP agent that streams prompts back to the editor")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Override the outbound request timeout (milliseconds)
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Delay between streamed chunks (milliseconds)
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(&args.log_level, args.json_logs) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SessionConfig::from_env().context("Failed to load config from environment")?,
    };
    if let Some(ms) = args.request_timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }

    let transport = StreamTransport::stdio().with_max_line_length(config.max_line_length);
    let agent = EchoAgent::new().with_chunk_delay(Duration::from_millis(args.chunk_delay_ms));
    let session = agent
        .register(AcpSession::builder(Role::Agent).config(config))
        .connect(transport)
        .await
        .context("Failed to start ACP session")?;

    tokio::select! {
        _ = session.closed() => info!("Client disconnected"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    session.close_gracefully().await?;
    Ok(())
}
