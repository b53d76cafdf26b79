use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

/// Widest shard accepted: two shard levels must fit inside the 32 hex characters of an identity.
pub const MAX_SHARD_WIDTH: usize = 16;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub source_root: String,
    #[serde(default = "default_store_root")]
    pub store_root: String,
    #[serde(default)]
    pub skip_levels: usize,
    #[serde(default)]
    pub compression: bool,
    #[serde(default = "default_shard_width")]
    pub shard_width: usize,
    #[serde(default = "default_precompressed_extensions")]
    pub precompressed_extensions: Vec<String>,
    #[serde(default)]
    pub remove_source: bool,
    #[serde(default = "default_file_concurrency")]
    pub file_concurrency: usize,
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
    #[serde(default)]
    pub reconcile_orphans: bool,
    pub surrealdb_address: String,
    #[serde(default)]
    pub surrealdb_username: Option<String>,
    #[serde(default)]
    pub surrealdb_password: Option<String>,
    #[serde(default = "default_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_database")]
    pub surrealdb_database: String,
}

fn default_store_root() -> String {
    "./store".to_string()
}

fn default_shard_width() -> usize {
    2
}

pub fn default_precompressed_extensions() -> Vec<String> {
    [".gz", ".zip", ".7z", ".arj", ".rar", ".avi", ".mp4"]
        .iter()
        .map(|ext| (*ext).to_string())
        .collect()
}

fn default_file_concurrency() -> usize {
    4
}

fn default_file_timeout_secs() -> u64 {
    300
}

fn default_namespace() -> String {
    "doclibr".to_string()
}

fn default_database() -> String {
    "archive".to_string()
}

impl AppConfig {
    /// Rejects settings that would make the whole run meaningless.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.shard_width == 0 || self.shard_width > MAX_SHARD_WIDTH {
            return Err(AppError::Validation(format!(
                "shard_width must be between 1 and {MAX_SHARD_WIDTH}, got {}",
                self.shard_width
            )));
        }

        if !Path::new(&self.source_root).is_dir() {
            return Err(AppError::Validation(format!(
                "source_root {} is not an accessible directory",
                self.source_root
            )));
        }

        if self.file_concurrency == 0 {
            return Err(AppError::Validation(
                "file_concurrency must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Database credentials are only used when both halves are present.
    pub fn surrealdb_credentials(&self) -> Option<(&str, &str)> {
        match (&self.surrealdb_username, &self.surrealdb_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("precompressed_extensions"),
        )
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .expect("config builds")
            .try_deserialize()
            .expect("config deserializes")
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg = from_toml(
            r#"
            source_root = "/srv/docs"
            surrealdb_address = "mem://"
            "#,
        );

        assert_eq!(cfg.store_root, "./store");
        assert_eq!(cfg.skip_levels, 0);
        assert!(!cfg.compression);
        assert_eq!(cfg.shard_width, 2);
        assert_eq!(cfg.precompressed_extensions, default_precompressed_extensions());
        assert!(!cfg.remove_source);
        assert_eq!(cfg.file_concurrency, 4);
        assert_eq!(cfg.file_timeout_secs, 300);
        assert!(cfg.surrealdb_credentials().is_none());
        assert_eq!(cfg.surrealdb_namespace, "doclibr");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = from_toml(
            r#"
            source_root = "/srv/docs"
            store_root = "/srv/store"
            skip_levels = 2
            compression = true
            shard_width = 3
            precompressed_extensions = [".zip"]
            surrealdb_address = "ws://localhost:8000"
            surrealdb_username = "root"
            surrealdb_password = "secret"
            "#,
        );

        assert_eq!(cfg.skip_levels, 2);
        assert!(cfg.compression);
        assert_eq!(cfg.shard_width, 3);
        assert_eq!(cfg.precompressed_extensions, vec![".zip".to_string()]);
        assert_eq!(cfg.surrealdb_credentials(), Some(("root", "secret")));
    }

    #[test]
    fn validate_rejects_bad_shard_width_and_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = from_toml(
            r#"
            source_root = "/definitely/not/here"
            surrealdb_address = "mem://"
            "#,
        );
        assert!(matches!(cfg.validate(), Err(AppError::Validation(_))));

        cfg.source_root = dir.path().to_string_lossy().into_owned();
        assert!(cfg.validate().is_ok());

        cfg.shard_width = 0;
        assert!(cfg.validate().is_err());
        cfg.shard_width = MAX_SHARD_WIDTH + 1;
        assert!(cfg.validate().is_err());
    }
}
