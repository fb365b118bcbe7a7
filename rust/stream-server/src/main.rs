//! Remote Dataset Streaming Server
//!
//! This binary serves a JSONL dataset to `stream-core` clients over the
//! framed `Info`/`Data` request/reply protocol.
//!
//! # Usage
//!
//! ```bash
//! # Serve a dataset with default settings
//! stream-server --data train.jsonl
//!
//! # Custom port and batch size
//! stream-server --data train.jsonl --port 6000 --batch-size 256
//!
//! # Legacy clients that expect the 8-byte end-of-stream reply
//! stream-server --data train.jsonl --end-of-stream sentinel
//! ```

mod service;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use service::StreamService;
use state::DatasetSource;
use stream_core::codec::EndOfStreamMode;

/// Remote Dataset Streaming Server
#[derive(Parser, Debug)]
#[command(name = "stream-server")]
#[command(about = "Serves a JSONL dataset to remote streaming clients")]
struct Args {
    /// JSONL file to serve, one JSON object per line
    #[arg(short, long)]
    data: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value = "5555")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    address: String,

    /// Records per batch
    #[arg(short, long, default_value = "1024")]
    batch_size: usize,

    /// End-of-stream signalling (tagged, sentinel)
    #[arg(long, default_value = "tagged")]
    end_of_stream: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let end_of_stream: EndOfStreamMode = args.end_of_stream.parse()?;

    let source = DatasetSource::from_jsonl_file(&args.data, args.batch_size)?;
    tracing::info!("Starting stream server");
    tracing::info!("  Dataset: {}", args.data.display());
    tracing::info!("  Records: {}", source.metadata().length);
    tracing::info!("  Batches: {} of up to {} records", source.num_batches(), args.batch_size);
    tracing::info!("  End of stream: {}", end_of_stream);

    let service = Arc::new(StreamService::new(Arc::new(source), end_of_stream.codec()));

    // Build address
    let addr: SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    service
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for CTRL+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
