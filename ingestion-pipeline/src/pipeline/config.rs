use common::utils::config::AppConfig;

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub file_concurrency: usize,
    pub file_timeout_secs: u64,
    pub walk_buffer: usize,
    pub reconcile_concurrency: usize,
    pub graph_store_attempts: usize,
    pub graph_initial_backoff_ms: u64,
    pub graph_max_backoff_ms: u64,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            file_concurrency: 4,
            file_timeout_secs: 300,
            walk_buffer: 256,
            reconcile_concurrency: 8,
            graph_store_attempts: 3,
            graph_initial_backoff_ms: 50,
            graph_max_backoff_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
    /// Leading directory levels that are traversed but not recorded.
    pub skip_levels: usize,
    pub remove_source: bool,
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: IngestionTuning {
                file_concurrency: config.file_concurrency.max(1),
                file_timeout_secs: config.file_timeout_secs,
                ..IngestionTuning::default()
            },
            skip_levels: config.skip_levels,
            remove_source: config.remove_source,
        }
    }
}
