mod config;
mod context;
mod stages;
mod state;
mod stats;

pub use config::{IngestionConfig, IngestionTuning};
pub use context::ParentRef;
pub use stats::{FileOutcome, IngestStats, IngestionSummary};

use std::{
    fmt,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{
        graph::ProvenanceGraph,
        store::{ContentStore, StoredBlob},
        types::item::Item,
    },
    utils::{codec::CompressionCodec, config::AppConfig, identity::ContentId},
};
use futures::{stream, StreamExt};
use tokio::{
    sync::{mpsc, Semaphore},
    task::{self, JoinSet},
    time,
};
use tracing::{debug, error, info, warn};

use crate::{
    restore::{restore_tree, RestoreSummary},
    walker::{DirectoryWalker, NodeKind, WalkEvent},
};

use self::{
    context::{DirectoryContext, FileContext},
    stages::{
        identify_directory, identify_file, link_directory, materialize, normalize_directory,
        normalize_file, place, recurse, remove_source, with_graph_retry,
    },
    state::{directory, file},
};

/// Result of sweeping the store for blobs no item refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub removed: usize,
    pub errors: usize,
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Blobs: {}, Orphans removed: {}, Errors: {}",
            self.scanned, self.removed, self.errors
        )
    }
}

#[allow(clippy::module_name_repetitions)]
#[derive(Clone)]
pub struct IngestionPipeline {
    graph: Arc<dyn ProvenanceGraph>,
    store: Arc<ContentStore>,
    codec: Arc<CompressionCodec>,
    pipeline_config: Arc<IngestionConfig>,
}

impl IngestionPipeline {
    pub fn new(
        graph: Arc<dyn ProvenanceGraph>,
        store: Arc<ContentStore>,
        codec: Arc<CompressionCodec>,
        pipeline_config: IngestionConfig,
    ) -> Self {
        Self {
            graph,
            store,
            codec,
            pipeline_config: Arc::new(pipeline_config),
        }
    }

    /// Opens the store and builds the codec described by `config`.
    pub fn from_config(
        graph: Arc<dyn ProvenanceGraph>,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let store = ContentStore::from_config(config)?;
        let codec = CompressionCodec::new(config.compression, &config.precompressed_extensions);

        Ok(Self::new(
            graph,
            Arc::new(store),
            Arc::new(codec),
            IngestionConfig::from_app_config(config),
        ))
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn graph(&self) -> &dyn ProvenanceGraph {
        self.graph.as_ref()
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Ingests everything below `source_root`.
    ///
    /// Only an inaccessible root or a failure to record the root item is fatal;
    /// every other failure is contained to the node it happened on.
    #[tracing::instrument(skip_all, fields(source_root = %source_root.display()))]
    pub async fn run(&self, source_root: &Path) -> Result<IngestionSummary, AppError> {
        let root = tokio::fs::canonicalize(source_root).await.map_err(|err| {
            AppError::Validation(format!(
                "source root {} is not accessible: {err}",
                source_root.display()
            ))
        })?;
        if !tokio::fs::metadata(&root).await?.is_dir() {
            return Err(AppError::Validation(format!(
                "source root {} is not a directory",
                root.display()
            )));
        }

        self.ensure_root(&root).await?;

        let started = Instant::now();
        let tuning = &self.pipeline_config.tuning;
        let skip_levels = self.pipeline_config.skip_levels;
        let stats = Arc::new(IngestStats::default());

        let (tx, mut rx) = mpsc::channel(tuning.walk_buffer.max(1));
        let walker = DirectoryWalker::new(root.clone());
        let walk_handle = task::spawn_blocking(move || walker.walk_into(&tx));

        let permits = Arc::new(Semaphore::new(tuning.file_concurrency.max(1)));
        let mut files = JoinSet::new();
        let root_ref = ParentRef {
            id: ContentId::ROOT,
            path: Arc::from(root.as_path()),
        };
        // Recorded directories on the path from the root to the current event.
        let mut ancestry: Vec<(usize, ParentRef)> = Vec::new();

        while let Some(event) = rx.recv().await {
            while ancestry
                .last()
                .is_some_and(|(depth, _)| *depth >= event.depth)
            {
                ancestry.pop();
            }
            let parent = ancestry
                .last()
                .map_or_else(|| root_ref.clone(), |(_, parent)| parent.clone());

            if event.is_directory() {
                stats.observe_depth(event.depth);
            }

            if event.depth <= skip_levels {
                if event.is_directory() {
                    debug!(path = %event.path.display(), depth = event.depth, "bypassing directory level");
                    stats.record_bypassed_directory();
                } else {
                    debug!(path = %event.path.display(), depth = event.depth, "file inside bypassed level; not ingested");
                    stats.record_bypassed_file();
                }
                continue;
            }

            match event.kind {
                NodeKind::Directory => {
                    if let Some(id) = self.ingest_directory(&event, &parent, &stats).await {
                        ancestry.push((
                            event.depth,
                            ParentRef {
                                id,
                                path: Arc::from(event.path.as_path()),
                            },
                        ));
                    }
                }
                NodeKind::File { .. } => {
                    stats.record_file_seen();
                    let permit = Arc::clone(&permits).acquire_owned().await.map_err(|err| {
                        AppError::InternalError(format!("file worker pool closed: {err}"))
                    })?;
                    let pipeline = self.clone();
                    let stats = Arc::clone(&stats);
                    files.spawn(async move {
                        let _permit = permit;
                        pipeline.ingest_file(event, parent, &stats).await;
                    });
                }
            }
        }

        let walked = walk_handle.await?;

        while let Some(joined) = files.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "file task failed to complete");
                stats.record_outcome(FileOutcome::Skipped, 0);
            }
        }

        let summary = stats.summary(skip_levels);
        info!(
            events = walked,
            elapsed_ms = Self::duration_millis(started.elapsed()),
            %summary,
            "ingestion finished"
        );

        Ok(summary)
    }

    /// Removes store blobs whose identity and extension no item records.
    ///
    /// Must not run concurrently with [`IngestionPipeline::run`]: a blob placed after
    /// its item reservation but before the sweep reads the graph would look orphaned.
    #[tracing::instrument(skip_all)]
    pub async fn reconcile_store(&self) -> Result<ReconcileSummary, AppError> {
        let store = Arc::clone(&self.store);
        let blobs = task::spawn_blocking(move || store.list_blobs()).await??;
        let mut summary = ReconcileSummary {
            scanned: blobs.len(),
            ..ReconcileSummary::default()
        };

        let results: Vec<Result<bool, AppError>> = stream::iter(blobs)
            .map(|blob| async move { self.reconcile_blob(blob).await })
            .buffer_unordered(self.pipeline_config.tuning.reconcile_concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(true) => summary.removed = summary.removed.saturating_add(1),
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "failed to reconcile blob");
                    summary.errors = summary.errors.saturating_add(1);
                }
            }
        }

        info!(%summary, "store reconciliation finished");
        Ok(summary)
    }

    /// Rebuilds the recorded hierarchy under `target`.
    pub async fn restore_tree(&self, target: &Path) -> Result<RestoreSummary, AppError> {
        restore_tree(self.graph.as_ref(), &self.store, target).await
    }

    async fn ensure_root(&self, root: &Path) -> Result<(), AppError> {
        let created = with_graph_retry(&self.pipeline_config.tuning, "ensure_root", || {
            self.graph.ensure_item(Item::root(root))
        })
        .await
        .inspect_err(|err| error!(root = %root.display(), error = %err, "failed to record root item"))?;

        debug!(root = %root.display(), created, "root item ready");
        Ok(())
    }

    async fn ingest_directory(
        &self,
        event: &WalkEvent,
        parent: &ParentRef,
        stats: &IngestStats,
    ) -> Option<ContentId> {
        match self.drive_directory(event, parent, stats).await {
            Ok(id) => {
                stats.record_directory();
                Some(id)
            }
            Err(_) => None,
        }
    }

    async fn drive_directory(
        &self,
        event: &WalkEvent,
        parent: &ParentRef,
        stats: &IngestStats,
    ) -> Result<ContentId, AppError> {
        let mut ctx = DirectoryContext::new(
            event,
            parent,
            self.graph.as_ref(),
            &self.pipeline_config,
            stats,
        );

        let machine = directory::discovered();
        let machine = normalize_directory(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let machine = identify_directory(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let machine = link_directory(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let _machine = recurse(machine).map_err(|err| ctx.abort(err))?;

        ctx.identity()
    }

    async fn ingest_file(&self, event: WalkEvent, parent: ParentRef, stats: &IngestStats) {
        let timeout_secs = self.pipeline_config.tuning.file_timeout_secs;
        let source_len = match event.kind {
            NodeKind::File { len } => len,
            NodeKind::Directory => 0,
        };

        let outcome = match time::timeout(
            Duration::from_secs(timeout_secs),
            self.drive_file(&event, &parent, stats),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            // Already logged by the failing stage.
            Ok(Err(_)) => FileOutcome::Skipped,
            Err(_) => {
                let err = AppError::Timeout(format!(
                    "{} not ingested within {timeout_secs}s",
                    event.path.display()
                ));
                warn!(path = %event.path.display(), error = %err, "file ingestion timed out");
                FileOutcome::Skipped
            }
        };

        stats.record_outcome(outcome, source_len);
    }

    async fn drive_file(
        &self,
        event: &WalkEvent,
        parent: &ParentRef,
        stats: &IngestStats,
    ) -> Result<FileOutcome, AppError> {
        let mut ctx = FileContext::new(
            event,
            parent,
            self.graph.as_ref(),
            &self.store,
            &self.codec,
            &self.pipeline_config,
            stats,
        );

        let machine = file::discovered();
        let machine = normalize_file(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let machine = materialize(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let machine = identify_file(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let placed = place(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let outcome = placed.outcome();

        if self.pipeline_config.remove_source {
            if let Err(err) = remove_source(placed, &mut ctx).await {
                warn!(
                    path = %event.path.display(),
                    error = %err,
                    "content ingested but source file could not be removed"
                );
            }
        }

        Ok(outcome)
    }

    async fn reconcile_blob(&self, blob: StoredBlob) -> Result<bool, AppError> {
        let referenced = self
            .graph
            .get_item(blob.id)
            .await?
            .is_some_and(|item| item.extension == blob.extension);
        if referenced {
            return Ok(false);
        }

        let store = Arc::clone(&self.store);
        let StoredBlob { id, extension, path } = blob;
        let removed = task::spawn_blocking(move || store.remove_blob(id, &extension)).await??;
        if removed {
            info!(blob = %path.display(), "removed orphaned blob");
        }
        Ok(removed)
    }
}
