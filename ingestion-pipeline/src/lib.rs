#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod restore;
pub mod walker;

pub use pipeline::{
    FileOutcome, IngestionConfig, IngestionPipeline, IngestionSummary, IngestionTuning,
    ReconcileSummary,
};
pub use restore::{restore_tree, RestoreSummary};
pub use walker::{DirectoryWalker, NodeKind, WalkEvent};
