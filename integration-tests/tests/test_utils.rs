use common::{
    storage::{db::SurrealDbClient, graph::SurrealProvenanceGraph},
    utils::config::{default_precompressed_extensions, AppConfig},
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

/// Sets up an in-memory graph with the item and link tables defined
pub async fn setup_test_graph() -> Arc<SurrealProvenanceGraph> {
    let namespace = "test_ns";
    let database = Uuid::new_v4().to_string();

    let db = SurrealDbClient::memory(namespace, &database)
        .await
        .expect("Failed to start in-memory surrealdb");

    db.ensure_initialized()
        .await
        .expect("Failed to define tables");

    Arc::new(SurrealProvenanceGraph::new(Arc::new(db)))
}

/// Creates configuration for a run from `source` into `store`
pub fn create_test_config(source: &Path, store: &Path) -> AppConfig {
    AppConfig {
        source_root: source.to_string_lossy().into_owned(),
        store_root: store.to_string_lossy().into_owned(),
        skip_levels: 1,
        compression: true,
        shard_width: 2,
        precompressed_extensions: default_precompressed_extensions(),
        remove_source: false,
        file_concurrency: 3,
        file_timeout_secs: 30,
        reconcile_orphans: false,
        surrealdb_address: "mem://".to_string(),
        surrealdb_username: None,
        surrealdb_password: None,
        surrealdb_namespace: "test_ns".to_string(),
        surrealdb_database: "test_db".to_string(),
    }
}

/// Writes `files` (relative path, contents) below `root`
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(relative, contents)| {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create parent dirs");
            }
            fs::write(&path, contents).expect("Failed to write test file");
            path
        })
        .collect()
}
