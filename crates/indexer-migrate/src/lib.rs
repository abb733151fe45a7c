//! # indexer-migrate
//!
//! Migrates Ethereum indexer tables from the v2 Postgres schema to the v3
//! schema, table by table, over arbitrary block height ranges.
//!
//! - **Worker pools** per table draining a shared range queue
//! - **Gap detection** for heights that could not be read, transformed or
//!   written, reported instead of retried
//! - **Log repair** re-deriving content-addressed IPLD blocks for stored logs
//! - **Page transfer** of `public.blocks` through a foreign table
//!
//! ## Example
//!
//! ```rust,no_run
//! use indexer_migrate::{BlockRange, Config, Migrator, TableName};
//!
//! #[tokio::main]
//! async fn main() -> indexer_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let migrator = Migrator::connect(&config).await?;
//!
//!     let (ranges, rx) = async_channel::unbounded();
//!     let mut migration = migrator.migrate(TableName::Headers, rx);
//!     ranges.send(BlockRange::new(0, 999)).await.ok();
//!     ranges.close();
//!
//!     migration.done.wait().await;
//!     while let Ok(gap) = migration.read_gaps.try_recv() {
//!         println!("read gap {}", gap);
//!     }
//!     migrator.close();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod gap;
pub mod migrator;
pub mod range;
pub mod report;
pub mod source;
pub mod tables;
pub mod target;
pub mod transform;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, LogConfig, MigrationConfig, TransferConfig};
pub use error::{MigrateError, Result};
pub use gap::{Gap, GapKind, GapReason};
pub use migrator::{Done, Migration, MigrationOptions, Migrator, Transfer};
pub use range::{segment, BlockRange};
pub use report::{HealthReport, RunReport, TableReport, TransferReport};
pub use source::{BlockReader, PgReader};
pub use tables::{NewRows, OldRows, TableName, TableSpec};
pub use target::{BlockWriter, PageCopier, PgWriter};
pub use transform::{Transformed, Transformer};
