//! Configuration type definitions.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::range::BlockRange;
use crate::tables::TableName;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// v2 database the rows are read from.
    pub old: DatabaseConfig,

    /// v3 database the rows are written to.
    pub new: DatabaseConfig,

    #[serde(default)]
    pub migration: MigrationConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Connection pool size for `db`: the configured maximum, or enough for
    /// every worker of every table plus two spare connections.
    pub fn pool_size(&self, db: &DatabaseConfig) -> usize {
        match db.max_connections {
            Some(n) if n > 0 => n,
            _ => self.migration.workers() * self.migration.tables.len().max(1) + 2,
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// disable | require | verify-ca | verify-full (default: disable).
    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Maximum open connections. Derived from the worker count if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    /// `host:port/database`, for log lines.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Which tables to migrate over which block ranges.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    /// Table names; any accepted alias resolves.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Workers per table (default: 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers_per_table: Option<usize>,

    /// Explicit `[start, stop]` ranges.
    #[serde(default)]
    pub ranges: Vec<BlockRange>,

    /// Single range appended to `ranges` when both bounds are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<u64>,

    /// Derive the range from the min/max header height in the old database.
    #[serde(default)]
    pub auto_range: bool,

    /// Blocks per range when ranges are segmented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_size: Option<u64>,

    /// Replaces the built-in set of tables for which an empty read is a gap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_exist_tables: Option<Vec<String>>,

    /// Report every failed read as a read gap, not just must-exist tables.
    #[serde(default)]
    pub gap_on_any_read_failure: bool,
}

impl MigrationConfig {
    /// Effective worker count; unset or zero means one.
    pub fn workers(&self) -> usize {
        match self.workers_per_table {
            Some(n) if n > 0 => n,
            _ => 1,
        }
    }

    /// Resolve the configured table names, rejecting duplicates.
    pub fn table_names(&self) -> Result<Vec<TableName>> {
        let mut seen = HashSet::new();
        let mut tables = Vec::with_capacity(self.tables.len());
        for raw in &self.tables {
            let table: TableName = raw.parse()?;
            if !seen.insert(table) {
                return Err(MigrateError::Config(format!(
                    "migration.tables lists {} more than once",
                    table
                )));
            }
            tables.push(table);
        }
        Ok(tables)
    }

    /// Configured ranges, with `start`/`stop` appended when both are set.
    pub fn block_ranges(&self) -> Result<Vec<BlockRange>> {
        let mut ranges = self.ranges.clone();
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => ranges.push(BlockRange::try_new(start, stop)?),
            (None, None) => {}
            _ => {
                return Err(MigrateError::Config(
                    "migration.start and migration.stop must be set together".into(),
                ))
            }
        }
        Ok(ranges)
    }

    /// Whether an empty read of `table` is a gap.
    pub fn must_exist(&self, table: TableName) -> Result<bool> {
        match &self.must_exist_tables {
            None => Ok(table.spec().must_exist),
            Some(names) => {
                for name in names {
                    if name.parse::<TableName>()? == table {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Bulk page transfer of `public.blocks` through a foreign table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Foreign table mapping the old `public.blocks` (default: v2db_public_blocks).
    #[serde(default = "default_fdw_table")]
    pub table_name: String,

    /// Pages copied per transaction (default: 1000).
    #[serde(default = "default_page_segment")]
    pub segment_size: u64,

    /// Leading segments to skip, to resume an interrupted transfer.
    #[serde(default)]
    pub segment_offset: u64,

    /// Last page to copy; 0 queries the foreign table for it.
    #[serde(default)]
    pub max_page: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            table_name: default_fdw_table(),
            segment_size: default_page_segment(),
            segment_offset: 0,
            max_page: 0,
        }
    }
}

/// Log output and gap file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default = "default_read_gaps_dir")]
    pub read_gaps_dir: PathBuf,

    #[serde(default = "default_write_gaps_dir")]
    pub write_gaps_dir: PathBuf,

    #[serde(default = "default_transfer_gaps_dir")]
    pub transfer_gaps_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: None,
            file: None,
            read_gaps_dir: default_read_gaps_dir(),
            write_gaps_dir: default_write_gaps_dir(),
            transfer_gaps_dir: default_transfer_gaps_dir(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_fdw_table() -> String {
    "v2db_public_blocks".to_string()
}

fn default_page_segment() -> u64 {
    1000
}

fn default_read_gaps_dir() -> PathBuf {
    PathBuf::from("./readGaps/")
}

fn default_write_gaps_dir() -> PathBuf {
    PathBuf::from("./writeGaps/")
}

fn default_transfer_gaps_dir() -> PathBuf {
    PathBuf::from("./transferGaps/")
}
