use std::{
    collections::{HashSet, VecDeque},
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use common::{
    error::AppError,
    storage::{
        graph::ProvenanceGraph,
        store::ContentStore,
        types::item::{Item, ItemKind},
    },
    utils::{codec::CompressionCodec, identity::ContentId},
};
use tokio::task;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Restored dirs: {}, files: {}, skipped links: {}",
            self.directories, self.files, self.skipped
        )
    }
}

/// Recreates the discovered hierarchy under `target` by walking links out of the root item.
///
/// Every distinct destination is written once; a link that cannot be restored
/// leaves its destination open for a later link. Links whose path is absolute
/// or climbs out of its parent are skipped.
#[tracing::instrument(skip_all, fields(target = %target.display()))]
pub async fn restore_tree(
    graph: &dyn ProvenanceGraph,
    store: &Arc<ContentStore>,
    target: &Path,
) -> Result<RestoreSummary, AppError> {
    tokio::fs::create_dir_all(target).await?;

    let mut summary = RestoreSummary::default();
    let mut queue = VecDeque::from([(ContentId::ROOT, target.to_path_buf())]);
    let mut expanded: HashSet<ContentId> = HashSet::from([ContentId::ROOT]);
    let mut written: HashSet<PathBuf> = HashSet::new();

    while let Some((node, dir)) = queue.pop_front() {
        for link in graph.links_from(node).await? {
            let Some(relative) = safe_relative(&link.path) else {
                warn!(parent = %node, path = %link.path, "refusing to restore unsafe link path");
                summary.skipped = summary.skipped.saturating_add(1);
                continue;
            };

            let destination = dir.join(relative);
            if written.contains(&destination) {
                continue;
            }

            let child = link.child()?;
            let Some(item) = graph.get_item(child).await? else {
                warn!(item_id = %child, "link points at a missing item");
                summary.skipped = summary.skipped.saturating_add(1);
                continue;
            };

            match item.kind {
                ItemKind::Directory => {
                    tokio::fs::create_dir_all(&destination).await?;
                    summary.directories = summary.directories.saturating_add(1);
                    written.insert(destination.clone());
                    if expanded.insert(child) {
                        queue.push_back((child, destination));
                    }
                }
                ItemKind::File => match restore_file(store, item, destination.clone()).await {
                    Ok(()) => {
                        summary.files = summary.files.saturating_add(1);
                        written.insert(destination);
                    }
                    Err(AppError::NotFound(what)) => {
                        warn!(item_id = %child, missing = %what, "blob missing; file not restored");
                        summary.skipped = summary.skipped.saturating_add(1);
                    }
                    Err(err) => return Err(err),
                },
                ItemKind::Root => {
                    debug!(item_id = %child, "ignoring link into the root item");
                    summary.skipped = summary.skipped.saturating_add(1);
                }
            }
        }
    }

    info!(%summary, "restore finished");
    Ok(summary)
}

async fn restore_file(
    store: &Arc<ContentStore>,
    item: Item,
    destination: PathBuf,
) -> Result<(), AppError> {
    let store = Arc::clone(store);
    task::spawn_blocking(move || {
        let id = item.content_id()?;
        let blob = store.open_blob(id, &item.extension)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&destination)?);
        CompressionCodec::decode(item.encoding, BufReader::new(blob), &mut out)?;
        out.flush()?;
        Ok(())
    })
    .await?
}

fn safe_relative(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let mut components = candidate.components().peekable();
    components.peek()?;
    components
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| candidate.to_path_buf())
}
