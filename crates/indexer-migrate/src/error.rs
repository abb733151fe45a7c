//! Error types for the migration library.

use thiserror::Error;

use crate::range::BlockRange;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for database connection or query errors.
pub const EXIT_DATABASE_ERROR: u8 = 2;
/// Exit code for runs that finished with gaps or per-range failures.
pub const EXIT_MIGRATION_ERROR: u8 = 3;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code used when the run was interrupted.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Table identifier did not resolve to a known table
    #[error("Unrecognized table name: {0}")]
    UnknownTable(String),

    /// Min/max block height could not be determined from the source
    #[error("Range detection failed: {0}")]
    RangeDetection(String),

    /// Reading a block range from the old database failed
    #[error("Read failed for {table} range {range}: {message}")]
    Read {
        table: String,
        range: BlockRange,
        message: String,
    },

    /// Converting old rows to new rows failed
    #[error("Transform failed for {table} range {range}: {message}")]
    Transform {
        table: String,
        range: BlockRange,
        message: String,
    },

    /// Writing a block range to the new database failed
    #[error("Write failed for {table} range {range}: {message}")]
    Write {
        table: String,
        range: BlockRange,
        message: String,
    },

    /// Page transfer through the foreign table failed
    #[error("Transfer failed for {table} pages {pages}: {message}")]
    Transfer {
        table: String,
        pages: BlockRange,
        message: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Read error for a table and range
    pub fn read(table: impl ToString, range: BlockRange, message: impl ToString) -> Self {
        MigrateError::Read {
            table: table.to_string(),
            range,
            message: message.to_string(),
        }
    }

    /// Create a Transform error for a table and range
    pub fn transform(table: impl ToString, range: BlockRange, message: impl ToString) -> Self {
        MigrateError::Transform {
            table: table.to_string(),
            range,
            message: message.to_string(),
        }
    }

    /// Create a Write error for a table and range
    pub fn write(table: impl ToString, range: BlockRange, message: impl ToString) -> Self {
        MigrateError::Write {
            table: table.to_string(),
            range,
            message: message.to_string(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::UnknownTable(_)
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::Database(_)
            | MigrateError::Pool { .. }
            | MigrateError::RangeDetection(_) => EXIT_DATABASE_ERROR,
            MigrateError::Read { .. }
            | MigrateError::Transform { .. }
            | MigrateError::Write { .. }
            | MigrateError::Transfer { .. } => EXIT_MIGRATION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(MigrateError::UnknownTable("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(MigrateError::pool("down", "ctx").exit_code(), EXIT_DATABASE_ERROR);
        assert_eq!(
            MigrateError::read("header_cids", BlockRange::new(1, 2), "boom").exit_code(),
            EXIT_MIGRATION_ERROR
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_range_errors_name_table_and_range() {
        let err = MigrateError::write("state_cids", BlockRange::new(10, 19), "connection reset");
        let msg = err.to_string();
        assert!(msg.contains("state_cids"));
        assert!(msg.contains("[10, 19]"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::Config("old.host is required".into());
        assert!(err.format_detailed().starts_with("Error: Configuration error"));
    }
}
