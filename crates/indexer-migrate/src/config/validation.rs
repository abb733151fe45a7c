//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::db::SslMode;
use crate::error::{MigrateError, Result};
use crate::tables::TableName;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database(&config.old, "old")?;
    validate_database(&config.new, "new")?;

    // Log repair reads and writes the v3 database; everything else needs two
    // distinct databases.
    let migration = &config.migration;
    let tables = migration.table_names()?;
    let repair_only = !tables.is_empty() && tables.iter().all(|t| *t == TableName::LogsRepair);
    if !repair_only
        && config.old.host == config.new.host
        && config.old.port == config.new.port
        && config.old.database == config.new.database
    {
        return Err(MigrateError::Config(
            "old and new cannot be the same database".into(),
        ));
    }

    migration.block_ranges()?;
    if let Some(names) = &migration.must_exist_tables {
        for name in names {
            name.parse::<TableName>()?;
        }
    }
    if migration.segment_size == Some(0) {
        return Err(MigrateError::Config(
            "migration.segment_size must be at least 1".into(),
        ));
    }
    if migration.auto_range && migration.segment_size.is_none() {
        return Err(MigrateError::Config(
            "migration.segment_size is required when migration.auto_range is set".into(),
        ));
    }

    if config.transfer.segment_size == 0 {
        return Err(MigrateError::Config(
            "transfer.segment_size must be at least 1".into(),
        ));
    }
    if config.transfer.table_name.trim().is_empty() {
        return Err(MigrateError::Config("transfer.table_name is required".into()));
    }

    Ok(())
}

fn validate_database(db: &DatabaseConfig, section: &str) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", section)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", section)));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", section)));
    }
    SslMode::parse(&db.ssl_mode)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogConfig, MigrationConfig, TransferConfig};
    use crate::range::BlockRange;

    fn database(host: &str, name: &str) -> DatabaseConfig {
        DatabaseConfig {
            host: host.to_string(),
            port: 5432,
            database: name.to_string(),
            user: "vdbm".to_string(),
            password: "password".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: None,
            connect_timeout_secs: 30,
        }
    }

    fn valid_config() -> Config {
        Config {
            old: database("localhost", "vulcanize_v2"),
            new: database("localhost", "vulcanize_v3"),
            migration: MigrationConfig {
                tables: vec!["headers".into(), "transactions".into()],
                ranges: vec![BlockRange::new(0, 1000)],
                ..Default::default()
            },
            transfer: TransferConfig::default(),
            log: LogConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_old_host() {
        let mut config = valid_config();
        config.old.host = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("old.host is required"));
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.new.database = config.old.database.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_log_repair_may_share_database() {
        let mut config = valid_config();
        config.new.database = config.old.database.clone();
        config.migration.tables = vec!["logs-repair".into()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_table_rejected() {
        let mut config = valid_config();
        config.migration.tables.push("blocks".into());
        assert!(matches!(validate(&config), Err(MigrateError::UnknownTable(_))));
    }

    #[test]
    fn test_auto_range_needs_segment_size() {
        let mut config = valid_config();
        config.migration.auto_range = true;
        assert!(validate(&config).is_err());
        config.migration.segment_size = Some(0);
        assert!(validate(&config).is_err());
        config.migration.segment_size = Some(1000);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_transfer_segment_rejected() {
        let mut config = valid_config();
        config.transfer.segment_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode_rejected() {
        let mut config = valid_config();
        config.new.ssl_mode = "sometimes".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.old.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.old);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_pool_size_follows_workers() {
        let mut config = valid_config();
        config.migration.workers_per_table = Some(3);
        assert_eq!(config.pool_size(&config.old), 3 * 2 + 2);
        config.old.max_connections = Some(10);
        assert_eq!(config.pool_size(&config.old), 10);
    }
}
