use std::{
    fs::{self, File},
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    error::AppError,
    utils::{
        config::{AppConfig, MAX_SHARD_WIDTH},
        identity::ContentId,
    },
};

/// Private directory inside the store where candidate blobs are materialized.
pub const STAGING_DIR: &str = ".staging";

/// Staging files untouched for this long belong to an interrupted run.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of moving a staged blob into its final location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Written,
    Duplicate,
}

/// A blob found on disk while listing the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub id: ContentId,
    pub extension: String,
    pub path: PathBuf,
}

/// Content-addressed blob store laid out as `base/hex[0:W]/hex[W:2W]/<hex><ext>`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    base: PathBuf,
    staging: PathBuf,
    shard_width: usize,
}

impl ContentStore {
    /// Opens (creating if needed) the store rooted at `base`.
    ///
    /// Stale staging files left by an interrupted run are removed. Recent ones
    /// may belong to another writer on the same store and are kept.
    pub fn open(base: impl Into<PathBuf>, shard_width: usize) -> Result<Self, AppError> {
        if shard_width == 0 || shard_width > MAX_SHARD_WIDTH {
            return Err(AppError::Validation(format!(
                "shard width must be between 1 and {MAX_SHARD_WIDTH}, got {shard_width}"
            )));
        }

        let base = base.into();
        fs::create_dir_all(&base)?;
        let base = fs::canonicalize(&base)?;
        let staging = base.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let store = Self {
            base,
            staging,
            shard_width,
        };
        store.purge_staging()?;
        Ok(store)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::open(&config.store_root, config.shard_width)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn shard_width(&self) -> usize {
        self.shard_width
    }

    /// Final location of the blob for `id` stored under `extension`.
    pub fn blob_path(&self, id: ContentId, extension: &str) -> PathBuf {
        let hex = id.to_hex();
        let width = self.shard_width;
        let first = hex.get(..width).unwrap_or_default();
        let second = hex.get(width..width.saturating_mul(2)).unwrap_or_default();
        self.base
            .join(first)
            .join(second)
            .join(format!("{hex}{extension}"))
    }

    /// Creates an empty private file inside the store to materialize candidate bytes into.
    ///
    /// The file is deleted when dropped unless committed.
    pub fn stage(&self) -> Result<NamedTempFile, AppError> {
        Ok(Builder::new()
            .prefix("blob-")
            .suffix(".partial")
            .tempfile_in(&self.staging)?)
    }

    /// Moves a staged blob to its final location without ever replacing an existing blob.
    pub fn commit(
        &self,
        staged: NamedTempFile,
        id: ContentId,
        extension: &str,
    ) -> Result<Placement, AppError> {
        let target = self.blob_path(id, extension);
        if target.exists() {
            debug!(blob = %target.display(), "blob already present; discarding staged copy");
            return Ok(Placement::Duplicate);
        }

        if let Some(shard) = target.parent() {
            fs::create_dir_all(shard)?;
        }

        match staged.persist_noclobber(&target) {
            Ok(_) => Ok(Placement::Written),
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                debug!(blob = %target.display(), "lost placement race; discarding staged copy");
                Ok(Placement::Duplicate)
            }
            Err(err) => Err(AppError::from(err)),
        }
    }

    pub fn contains(&self, id: ContentId, extension: &str) -> bool {
        self.blob_path(id, extension).is_file()
    }

    pub fn open_blob(&self, id: ContentId, extension: &str) -> Result<File, AppError> {
        let path = self.blob_path(id, extension);
        File::open(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => AppError::NotFound(format!("blob {}", path.display())),
            _ => AppError::from(err),
        })
    }

    /// Deletes a blob and any shard directories it leaves empty. Returns false if it was absent.
    pub fn remove_blob(&self, id: ContentId, extension: &str) -> Result<bool, AppError> {
        let path = self.blob_path(id, extension);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(AppError::from(err)),
        }

        let mut dir = path.parent();
        while let Some(shard) = dir {
            if shard == self.base || fs::remove_dir(shard).is_err() {
                break;
            }
            dir = shard.parent();
        }

        Ok(true)
    }

    /// Every blob currently in the store, in path order.
    pub fn list_blobs(&self) -> Result<Vec<StoredBlob>, AppError> {
        let mut blobs = Vec::new();
        let walker = WalkDir::new(&self.base)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != STAGING_DIR);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "unreadable entry while listing store");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let parsed = parse_blob_name(&entry.file_name().to_string_lossy())
                .map(|(id, extension)| (id, extension.to_string()));
            match parsed {
                Some((id, extension)) => blobs.push(StoredBlob {
                    id,
                    extension,
                    path: entry.into_path(),
                }),
                None => {
                    warn!(file = %entry.path().display(), "foreign file in store; ignoring");
                }
            }
        }

        Ok(blobs)
    }

    fn purge_staging(&self) -> Result<(), AppError> {
        let now = SystemTime::now();
        for entry in fs::read_dir(&self.staging)? {
            let entry = entry?;
            let path = entry.path();
            let age = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default());
            match age {
                Ok(age) if age < STALE_STAGING_AGE => continue,
                Ok(_) => {}
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "unable to age staging file; keeping it");
                    continue;
                }
            }

            match fs::remove_file(&path) {
                Ok(()) => debug!(file = %path.display(), "removed stale staging file"),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "failed to remove staging file");
                }
            }
        }
        Ok(())
    }
}

fn parse_blob_name(file_name: &str) -> Option<(ContentId, &str)> {
    let hex = file_name.get(..32)?;
    let extension = file_name.get(32..)?;
    ContentId::from_hex(hex).ok().map(|id| (id, extension))
}
