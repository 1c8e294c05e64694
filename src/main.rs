//! Command-line uploader.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chunkstream_upload::chunk::SourceFile;
use chunkstream_upload::config::UploadConfig;
use chunkstream_upload::coordinator::{ChannelObserver, UploadNotification, UploadSessionManager};
use chunkstream_upload::integrity::HashAlgorithm;
use chunkstream_upload::session::UploadStatus;

#[derive(Parser, Debug)]
#[command(name = "chunkstream_upload", version)]
#[command(about = "Upload files in resumable chunks to a check/chunk/merge endpoint")]
struct Cli {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the upload endpoints (e.g. http://localhost:3000/upload)
    #[arg(short, long)]
    action: Option<String>,

    /// Chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Chunk uploads in flight per file
    #[arg(long)]
    concurrency: Option<i32>,

    /// Digest algorithm (md5 or blake3)
    #[arg(long)]
    hash: Option<HashAlgorithm>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    async fn upload_config(&self) -> anyhow::Result<UploadConfig> {
        let mut config = match (&self.config, &self.action) {
            (Some(path), _) => UploadConfig::from_json_file(path)
                .await
                .with_context(|| format!("loading {}", path.display()))?,
            (None, Some(action)) => UploadConfig::new(action.clone()),
            (None, None) => bail!("either --config or --action is required"),
        };

        if let Some(action) = &self.action {
            config.action = action.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_max_concurrent(concurrency);
        }
        if let Some(hash) = self.hash {
            config = config.with_hash_algorithm(hash);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_request_timeout(std::time::Duration::from_secs(timeout));
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.upload_config().await?;

    let (observer, mut notifications) = ChannelObserver::new();
    let manager = UploadSessionManager::with_http(config, Arc::new(observer))?;

    let mut ids = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let source = SourceFile::from_path(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        ids.push(manager.submit(source).await?);
    }

    let reporter = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                UploadNotification::Progress { id, percent } => {
                    tracing::info!(task = %id, "{percent:.1}%");
                }
                UploadNotification::Success { snapshot, response } => {
                    tracing::info!(file = %snapshot.file_name, %response, "uploaded");
                }
                UploadNotification::Error { snapshot, message } => {
                    tracing::error!(file = %snapshot.file_name, "{message}");
                }
                UploadNotification::Status { .. } => {}
            }
        }
    });

    let waiter = {
        let manager = manager.clone();
        let ids = ids.clone();
        async move {
            let mut failed = 0;
            for id in ids {
                if manager.wait_settled(id).await? != UploadStatus::Success {
                    failed += 1;
                }
            }
            anyhow::Ok(failed)
        }
    };

    let failed = tokio::select! {
        result = waiter => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, canceling uploads");
            for id in &ids {
                // Already finished tasks refuse the cancel.
                let _ = manager.cancel(*id).await;
            }
            ids.len()
        }
    };

    drop(manager);
    reporter.abort();

    if failed > 0 {
        bail!("{failed} of {} uploads did not complete", ids.len());
    }
    Ok(())
}
