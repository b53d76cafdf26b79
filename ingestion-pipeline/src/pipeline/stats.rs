use std::{
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// How a single discovered file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Stored,
    Duplicate,
    Skipped,
}

/// Run-wide counters shared by every file task.
#[derive(Debug, Default)]
pub struct IngestStats {
    directories: AtomicU64,
    bypassed_directories: AtomicU64,
    max_depth: AtomicUsize,
    files_seen: AtomicU64,
    files_new: AtomicU64,
    files_duplicate: AtomicU64,
    files_skipped: AtomicU64,
    files_bypassed: AtomicU64,
    source_bytes: AtomicU64,
    stored_bytes: AtomicU64,
    persistence_errors: AtomicU64,
}

impl IngestStats {
    pub fn observe_depth(&self, depth: usize) {
        self.max_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn record_directory(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypassed_directory(&self) {
        self.bypassed_directories.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypassed_file(&self) {
        self.files_bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_seen(&self) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: FileOutcome, source_bytes: u64) {
        let counter = match outcome {
            FileOutcome::Stored => &self.files_new,
            FileOutcome::Duplicate => &self.files_duplicate,
            FileOutcome::Skipped => &self.files_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if outcome != FileOutcome::Skipped {
            self.source_bytes.fetch_add(source_bytes, Ordering::Relaxed);
        }
    }

    pub fn record_stored_bytes(&self, bytes: u64) {
        self.stored_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self, skip_levels: usize) -> IngestionSummary {
        let deepest = self.max_depth.load(Ordering::Relaxed);
        let bypassed_levels = skip_levels.min(deepest);
        IngestionSummary {
            directories: self.directories.load(Ordering::Relaxed),
            bypassed_directories: self.bypassed_directories.load(Ordering::Relaxed),
            bypassed_levels,
            recorded_levels: deepest.saturating_sub(bypassed_levels),
            files_seen: self.files_seen.load(Ordering::Relaxed),
            files_new: self.files_new.load(Ordering::Relaxed),
            files_duplicate: self.files_duplicate.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_bypassed: self.files_bypassed.load(Ordering::Relaxed),
            source_bytes: self.source_bytes.load(Ordering::Relaxed),
            stored_bytes: self.stored_bytes.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
        }
    }
}

/// Final report of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub directories: u64,
    pub bypassed_directories: u64,
    pub bypassed_levels: usize,
    pub recorded_levels: usize,
    pub files_seen: u64,
    pub files_new: u64,
    pub files_duplicate: u64,
    pub files_skipped: u64,
    pub files_bypassed: u64,
    /// Original size of every ingested file, duplicates included.
    pub source_bytes: u64,
    /// Bytes newly written to the store during this run.
    pub stored_bytes: u64,
    pub persistence_errors: u64,
}

impl fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total Dirs: {}, Levels: {}+{}, Files: {}+{}, Size: {} bytes, Stored: {} bytes, Skipped: {}, Bypassed: {}, Errors: {}",
            self.directories,
            self.bypassed_levels,
            self.recorded_levels,
            self.files_new,
            self.files_duplicate,
            self.source_bytes,
            self.stored_bytes,
            self.files_skipped,
            self.files_bypassed,
            self.persistence_errors
        )
    }
}
