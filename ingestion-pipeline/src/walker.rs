use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File { len: u64 },
}

/// A node discovered below the walk root.
#[derive(Debug, Clone)]
pub struct WalkEvent {
    /// Absolute path of the node.
    pub path: PathBuf,
    /// Descent from the root; direct children of the root are at depth 1.
    pub depth: usize,
    pub kind: NodeKind,
    pub modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

impl WalkEvent {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }
}

/// Depth-first, name-ordered traversal that never aborts on a single unreadable entry.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every directory and regular file below the root. A directory always precedes its contents.
    pub fn events(&self) -> impl Iterator<Item = WalkEvent> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => to_event(&entry),
                Err(err) => {
                    // An unreadable directory contributes no entries.
                    warn!(
                        path = ?err.path(),
                        depth = err.depth(),
                        error = %err,
                        "enumeration error; continuing traversal"
                    );
                    None
                }
            })
    }

    /// Feeds events into `tx` until the walk ends or the receiver goes away.
    ///
    /// Blocking; run it on a blocking thread. Returns the number of events delivered.
    pub fn walk_into(self, tx: &mpsc::Sender<WalkEvent>) -> usize {
        let mut delivered = 0usize;
        for event in self.events() {
            if tx.blocking_send(event).is_err() {
                debug!(root = %self.root.display(), "walk receiver dropped; stopping traversal");
                break;
            }
            delivered = delivered.saturating_add(1);
        }
        delivered
    }
}

fn to_event(entry: &walkdir::DirEntry) -> Option<WalkEvent> {
    let file_type = entry.file_type();
    if !file_type.is_dir() && !file_type.is_file() {
        debug!(path = %entry.path().display(), "skipping special file or symlink");
        return None;
    }

    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!(path = %entry.path().display(), error = %err, "unable to read metadata; skipping entry");
            return None;
        }
    };

    let kind = if file_type.is_dir() {
        NodeKind::Directory
    } else {
        NodeKind::File {
            len: metadata.len(),
        }
    };

    Some(WalkEvent {
        path: entry.path().to_path_buf(),
        depth: entry.depth(),
        kind,
        modified: metadata.modified().ok(),
        created: metadata.created().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("2021").join("jan")).expect("mkdir jan");
        fs::create_dir_all(root.join("2021").join("feb")).expect("mkdir feb");
        fs::write(root.join("2021").join("jan").join("report.txt"), b"X").expect("write");
        fs::write(root.join("2021").join("feb").join("copy_report.txt"), b"X").expect("write");
        fs::write(root.join("top.md"), b"").expect("write");
        dir
    }

    #[test]
    fn directories_precede_their_contents_in_name_order() {
        let tree = sample_tree();
        let events: Vec<_> = DirectoryWalker::new(tree.path()).events().collect();

        let relative: Vec<(String, usize, bool)> = events
            .iter()
            .map(|event| {
                let rel = event
                    .path
                    .strip_prefix(tree.path())
                    .expect("below root")
                    .to_string_lossy()
                    .replace('\\', "/");
                (rel, event.depth, event.is_directory())
            })
            .collect();

        assert_eq!(
            relative,
            vec![
                ("2021".to_string(), 1, true),
                ("2021/feb".to_string(), 2, true),
                ("2021/feb/copy_report.txt".to_string(), 3, false),
                ("2021/jan".to_string(), 2, true),
                ("2021/jan/report.txt".to_string(), 3, false),
                ("top.md".to_string(), 1, false),
            ]
        );
    }

    #[test]
    fn file_events_carry_length() {
        let tree = sample_tree();
        let report = DirectoryWalker::new(tree.path())
            .events()
            .find(|event| event.file_name() == "report.txt")
            .expect("report event");
        assert_eq!(report.kind, NodeKind::File { len: 1 });
        assert!(report.modified.is_some());
    }

    #[test]
    fn missing_root_yields_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events: Vec<_> = DirectoryWalker::new(dir.path().join("gone"))
            .events()
            .collect();
        assert!(events.is_empty());
    }

    #[test]
    fn vanished_subdirectory_does_not_stop_the_walk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("a")).expect("mkdir a");
        fs::create_dir_all(root.join("b")).expect("mkdir b");
        fs::write(root.join("b").join("inner.txt"), b"gone").expect("write");
        fs::create_dir_all(root.join("c")).expect("mkdir c");
        fs::write(root.join("c").join("after.txt"), b"kept").expect("write");

        let mut seen = Vec::new();
        for event in DirectoryWalker::new(root).events() {
            // "b" is already listed by its parent but can no longer be read.
            if event.file_name() == "a" {
                fs::remove_dir_all(root.join("b")).expect("remove b");
            }
            let rel = event
                .path
                .strip_prefix(root)
                .expect("below root")
                .to_string_lossy()
                .replace('\\', "/");
            seen.push(rel);
        }

        assert_eq!(seen, vec!["a", "c", "c/after.txt"]);
    }

    #[tokio::test]
    async fn walk_into_streams_every_event() {
        let tree = sample_tree();
        let (tx, mut rx) = mpsc::channel(2);
        let walker = DirectoryWalker::new(tree.path());
        let handle = tokio::task::spawn_blocking(move || walker.walk_into(&tx));

        let mut received = 0usize;
        while rx.recv().await.is_some() {
            received += 1;
        }
        let delivered = handle.await.expect("walker thread");
        assert_eq!(delivered, 6);
        assert_eq!(received, 6);
    }
}
