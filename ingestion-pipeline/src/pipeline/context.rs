use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{graph::ProvenanceGraph, store::ContentStore},
    utils::{codec::CompressionCodec, codec::Encoding, identity::ContentId},
};
use tempfile::NamedTempFile;
use tracing::{error, warn};

use crate::walker::WalkEvent;

use super::{config::IngestionConfig, stats::IngestStats};

/// Where a node hangs in the graph: its parent identity and the parent's on-disk path.
#[derive(Debug, Clone)]
pub struct ParentRef {
    pub id: ContentId,
    pub path: Arc<Path>,
}

impl ParentRef {
    /// Link label for `child`: its path relative to the parent, `/`-separated.
    pub fn relative_path(&self, child: &Path) -> String {
        child
            .strip_prefix(&self.path)
            .unwrap_or(child)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

pub struct FileContext<'a> {
    pub event: &'a WalkEvent,
    pub parent: &'a ParentRef,
    pub graph: &'a dyn ProvenanceGraph,
    pub store: &'a Arc<ContentStore>,
    pub codec: &'a Arc<CompressionCodec>,
    pub pipeline_config: &'a IngestionConfig,
    pub stats: &'a IngestStats,
    pub name: String,
    pub extension: String,
    pub encoding: Encoding,
    pub staged: Option<NamedTempFile>,
    pub source_len: u64,
    pub stored_len: u64,
    pub identity: Option<ContentId>,
}

impl<'a> FileContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event: &'a WalkEvent,
        parent: &'a ParentRef,
        graph: &'a dyn ProvenanceGraph,
        store: &'a Arc<ContentStore>,
        codec: &'a Arc<CompressionCodec>,
        pipeline_config: &'a IngestionConfig,
        stats: &'a IngestStats,
    ) -> Self {
        Self {
            event,
            parent,
            graph,
            store,
            codec,
            pipeline_config,
            stats,
            name: String::new(),
            extension: String::new(),
            encoding: Encoding::Verbatim,
            staged: None,
            source_len: 0,
            stored_len: 0,
            identity: None,
        }
    }

    pub fn identity(&self) -> Result<ContentId, AppError> {
        self.identity
            .ok_or_else(|| AppError::InternalError("identity expected to be assigned".into()))
    }

    pub fn take_staged(&mut self) -> Result<NamedTempFile, AppError> {
        self.staged.take().ok_or_else(|| {
            AppError::InternalError("staged blob expected to be available for placement".into())
        })
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.event.modified.map_or_else(Utc::now, DateTime::<Utc>::from)
    }

    /// Logs the failure and drops any staged blob.
    pub fn abort(&mut self, err: AppError) -> AppError {
        self.staged = None;
        match err {
            AppError::Validation(_) => warn!(
                path = %self.event.path.display(),
                reason = %err,
                "skipping file"
            ),
            _ => error!(
                path = %self.event.path.display(),
                parent = %self.parent.id,
                error = %err,
                "file ingestion aborted"
            ),
        }
        err
    }
}

pub struct DirectoryContext<'a> {
    pub event: &'a WalkEvent,
    pub parent: &'a ParentRef,
    pub graph: &'a dyn ProvenanceGraph,
    pub pipeline_config: &'a IngestionConfig,
    pub stats: &'a IngestStats,
    pub name: String,
    pub identity: Option<ContentId>,
}

impl<'a> DirectoryContext<'a> {
    pub fn new(
        event: &'a WalkEvent,
        parent: &'a ParentRef,
        graph: &'a dyn ProvenanceGraph,
        pipeline_config: &'a IngestionConfig,
        stats: &'a IngestStats,
    ) -> Self {
        Self {
            event,
            parent,
            graph,
            pipeline_config,
            stats,
            name: String::new(),
            identity: None,
        }
    }

    pub fn identity(&self) -> Result<ContentId, AppError> {
        self.identity
            .ok_or_else(|| AppError::InternalError("identity expected to be assigned".into()))
    }

    /// Creation time, falling back to modification time.
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.event
            .created
            .or(self.event.modified)
            .map_or_else(Utc::now, DateTime::<Utc>::from)
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            path = %self.event.path.display(),
            parent = %self.parent.id,
            error = %err,
            "directory ingestion aborted; its contents attach to the nearest recorded ancestor"
        );
        err
    }
}
