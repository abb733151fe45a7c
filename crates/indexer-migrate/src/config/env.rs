//! Environment variable overrides.
//!
//! Variables take precedence over the YAML file. Lists are comma separated.

use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, DatabaseConfig};
use crate::error::{MigrateError, Result};

/// Apply every recognised variable found through `lookup`.
pub fn apply<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    apply_database(&mut config.old, "OLD_DATABASE", &lookup)?;
    apply_database(&mut config.new, "NEW_DATABASE", &lookup)?;

    let m = &mut config.migration;
    if let Some(v) = lookup("MIGRATION_START") {
        m.start = Some(parse("MIGRATION_START", &v)?);
    }
    if let Some(v) = lookup("MIGRATION_STOP") {
        m.stop = Some(parse("MIGRATION_STOP", &v)?);
    }
    if let Some(v) = lookup("MIGRATION_TABLE_NAMES") {
        m.tables = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = lookup("MIGRATION_WORKERS_PER_TABLE") {
        m.workers_per_table = Some(parse("MIGRATION_WORKERS_PER_TABLE", &v)?);
    }
    if let Some(v) = lookup("MIGRATION_AUTO_RANGE") {
        m.auto_range = parse("MIGRATION_AUTO_RANGE", &v)?;
    }
    if let Some(v) = lookup("MIGRATION_AUTO_RANGE_SEGMENT_SIZE") {
        m.segment_size = Some(parse("MIGRATION_AUTO_RANGE_SEGMENT_SIZE", &v)?);
    }

    if let Some(v) = lookup("TRANSFER_TABLE_NAME") {
        config.transfer.table_name = v;
    }
    if let Some(v) = lookup("TRANSFER_SEGMENT_SIZE") {
        config.transfer.segment_size = parse("TRANSFER_SEGMENT_SIZE", &v)?;
    }

    let log = &mut config.log;
    if let Some(v) = lookup("LOG_READ_GAPS_DIR") {
        log.read_gaps_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("LOG_WRITE_GAPS_DIR") {
        log.write_gaps_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("LOG_TRANSFER_GAPS_DIR") {
        log.transfer_gaps_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("LOGRUS_LEVEL") {
        log.level = Some(v);
    }
    if let Some(v) = lookup("LOGRUS_FILE") {
        log.file = Some(PathBuf::from(v));
    }

    Ok(())
}

fn apply_database<F>(db: &mut DatabaseConfig, prefix: &str, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        let name = format!("{}_{}", prefix, suffix);
        lookup(&name).map(|value| (name, value))
    };

    if let Some((_, v)) = var("NAME") {
        db.database = v;
    }
    if let Some((_, v)) = var("HOSTNAME") {
        db.host = v;
    }
    if let Some((name, v)) = var("PORT") {
        db.port = parse(&name, &v)?;
    }
    if let Some((_, v)) = var("USER") {
        db.user = v;
    }
    if let Some((_, v)) = var("PASSWORD") {
        db.password = v;
    }
    if let Some((name, v)) = var("MAX_OPEN_CONNECTIONS") {
        db.max_connections = Some(parse(&name, &v)?);
    }
    Ok(())
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MigrateError::Config(format!("{}='{}': {}", name, value, e)))
}
