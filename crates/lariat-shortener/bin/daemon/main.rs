mod cli;

use std::sync::Arc;

use crate::cli::{StorageBackendArg, CLI};
use clap::Parser;
use lariat_shortener::worker::delete_pipeline;
use lariat_storage::{build_storage, StorageConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = CLI::try_parse()?;

    info!(
        storage_backend = %config.storage,
        base_url = %config.base_url,
        delete_batch_size = config.delete_batch_size,
        "starting lariat shortener"
    );

    let storage_config = match config.storage {
        StorageBackendArg::InMemory => StorageConfig::default(),
        StorageBackendArg::File => StorageConfig {
            postgres_dsn: None,
            file_path: config.file_path.clone(),
        },
        StorageBackendArg::Postgres => StorageConfig {
            postgres_dsn: config.postgres_dsn.clone(),
            file_path: None,
        },
    };
    let storage = build_storage(&storage_config).await?;

    let (queue, worker) = delete_pipeline(Arc::clone(&storage));
    let worker = worker.with_batch_size(config.delete_batch_size);
    let worker_handle = tokio::spawn(worker.run());

    // Transport handlers would hold clones of `queue` and a
    // `ShortenerService` over the same storage; this process hosts the
    // deletion pipeline until interrupted.
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    drop(queue);
    worker_handle.await?;
    storage.close().await?;
    Ok(())
}
