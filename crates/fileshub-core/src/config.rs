use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Xxhash64,
    Blake3,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file holding the catalog and the quarantine.
    pub database_path: String,
    /// Changing this on an existing database makes old and new hashes incomparable.
    pub hash_algorithm: HashAlgorithm,
    /// Hashing threads; 0 lets rayon pick one per core.
    pub hash_workers: usize,
    /// Paths hashed in parallel before their results are committed in order.
    pub commit_batch_size: usize,
    /// Glob patterns skipped when expanding directory arguments.
    pub ignore_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "fileshub.db".to_string(),
            hash_algorithm: HashAlgorithm::default(),
            hash_workers: 0,
            commit_batch_size: 256,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Load `Config.toml` (if present), then `FILESHUB_*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("FILESHUB"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(ConfigFile::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_source_gives_defaults() {
        let config = from_toml("");
        assert_eq!(config.database_path, "fileshub.db");
        assert_eq!(config.hash_algorithm, HashAlgorithm::Xxhash64);
        assert_eq!(config.commit_batch_size, 256);
        assert!(config.ignore_patterns.is_empty());
    }

    #[test]
    fn test_overrides_are_read() {
        let config = from_toml(
            r#"
            database_path = "/tmp/hub.db"
            hash_algorithm = "blake3"
            hash_workers = 4
            ignore_patterns = ["**/.git/**", "*.tmp"]
            "#,
        );
        assert_eq!(config.database_path, "/tmp/hub.db");
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.hash_workers, 4);
        assert_eq!(config.ignore_patterns.len(), 2);
    }
}
