use std::{path::Path, sync::Arc};

use anyhow::Context;
use common::{
    storage::{db::SurrealDbClient, graph::SurrealProvenanceGraph},
    utils::config::get_config,
};
use ingestion_pipeline::IngestionPipeline;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            config.surrealdb_credentials(),
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .with_context(|| format!("failed to connect to {}", config.surrealdb_address))?,
    );

    // Ensure db is initialized
    db.ensure_initialized()
        .await
        .context("failed to define item and link tables")?;

    let graph = Arc::new(SurrealProvenanceGraph::new(db));
    let pipeline = IngestionPipeline::from_config(graph, &config)
        .with_context(|| format!("failed to open store at {}", config.store_root))?;

    info!(
        source_root = %config.source_root,
        store_root = %pipeline.store().base().display(),
        skip_levels = config.skip_levels,
        compression = config.compression,
        "starting ingestion"
    );

    let summary = pipeline
        .run(Path::new(&config.source_root))
        .await
        .context("ingestion aborted")?;
    info!(%summary, "run summary");

    if config.reconcile_orphans {
        let reconciled = pipeline
            .reconcile_store()
            .await
            .context("store reconciliation failed")?;
        info!(%reconciled, "reconciliation summary");
    }

    Ok(())
}
