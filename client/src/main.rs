use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use client::{GatewayClient, TransferOptions, download_file, upload_file};
use common::retry::RetryConfig;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    gateway_url: String,

    /// Chunk requests in flight at once
    #[arg(long, default_value_t = 8)]
    max_inflight: usize,

    /// Attempts per chunk before giving up
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Timeout of a single chunk request
    #[arg(long, default_value_t = 60)]
    chunk_timeout_secs: u64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Upload a local file; prints the file id
    Upload {
        path: PathBuf,
        /// Chunk size in bytes (gateway default when unset)
        #[arg(long)]
        chunk_size: Option<i64>,
    },
    /// Download a stored file to `output`
    Download { file_id: String, output: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let args = Args::parse();

    let http = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .build()?;
    let gateway = GatewayClient::new(http, &args.gateway_url);

    let opts = TransferOptions {
        max_inflight: args.max_inflight,
        retry: RetryConfig {
            max_attempts: args.max_attempts,
            per_attempt_timeout: Duration::from_secs(args.chunk_timeout_secs),
            ..RetryConfig::default()
        },
    };

    match args.cmd {
        Cmd::Upload { path, chunk_size } => {
            let plan = upload_file(&gateway, &path, chunk_size, &opts).await?;
            println!("{}", plan.file_id);
        }
        Cmd::Download { file_id, output } => {
            let written = download_file(&gateway, &file_id, &output, &opts).await?;
            println!("{written} bytes written to {}", output.display());
        }
    }

    Ok(())
}
