//! Reference endpoint server: check/chunk/merge over a disk chunk store.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chunkstream_upload::api::{create_api_server, ServerConfig};
use chunkstream_upload::integrity::HashAlgorithm;
use chunkstream_upload::metrics::{install_recorder, metrics_route, MetricsConfig};

#[derive(Parser, Debug)]
#[command(name = "chunkstream-server", version)]
#[command(about = "Reference server for chunked uploads")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// Storage root for chunks and merged files
    #[arg(short, long, default_value = "./uploads")]
    root: PathBuf,

    /// Route prefix of the upload endpoints
    #[arg(long, default_value = "/upload")]
    prefix: String,

    /// Digest algorithm clients hash with
    #[arg(long, default_value = "md5")]
    hash: HashAlgorithm,

    /// Serve Prometheus metrics at /metrics
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::new(&args.root)
        .with_prefix(args.prefix.clone())
        .with_hash_algorithm(args.hash);
    let prefix = config.route_prefix().to_string();

    let mut app = create_api_server(config)
        .await
        .with_context(|| format!("opening storage at {}", args.root.display()))?;

    if args.metrics {
        install_recorder()?;
        app = app.route(&MetricsConfig::default().endpoint, metrics_route());
    }

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;

    tracing::info!(
        addr = %args.listen,
        root = %args.root.display(),
        check = %format!("{prefix}/check"),
        chunk = %format!("{prefix}/chunk"),
        merge = %format!("{prefix}/merge"),
        hash = args.hash.as_str(),
        metrics = args.metrics,
        "chunkstream server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
