//! Configuration loading and validation.

mod env;
mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        env::apply(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        env::apply(self, lookup)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for run reports.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
old:
  host: localhost
  database: vulcanize_v2
  user: vdbm
  password: secret
new:
  host: localhost
  port: 5433
  database: vulcanize_v3
  user: vdbm
migration:
  tables: [headers, state, accounts]
  workers_per_table: 2
  ranges:
    - [0, 999]
    - [5000, 5999]
transfer:
  segment_size: 500
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.new.port, 5433);
        assert_eq!(config.old.port, 5432);
        assert_eq!(config.old.ssl_mode, "disable");
        assert_eq!(config.migration.ranges.len(), 2);
        assert_eq!(config.transfer.segment_size, 500);
        assert_eq!(config.transfer.table_name, "v2db_public_blocks");
        assert_eq!(config.log.read_gaps_dir, std::path::PathBuf::from("./readGaps/"));
    }

    #[test]
    fn test_inverted_range_rejected_at_parse() {
        let yaml = YAML.replace("[5000, 5999]", "[5999, 5000]");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml(YAML).unwrap();
        let b = Config::from_yaml(YAML).unwrap();
        assert_eq!(a.hash(), b.hash());

        let c = Config::from_yaml(&YAML.replace("workers_per_table: 2", "workers_per_table: 3")).unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("indexer-migrate-{}.yaml", std::process::id()));
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(config.is_ok());
    }
}
