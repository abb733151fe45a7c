//! Concurrent migration of block ranges from the v2 to the v3 schema.
//!
//! A [`Migrator`] owns the connection pools and hands out per-table worker
//! pools through [`Migrator::migrate`]. Each call spawns a fixed number of
//! workers that share one range receiver and report on unbounded gap and
//! error channels, so a slow consumer never stalls migration. Every pool
//! stops when its range source closes, when its own `quit` token is
//! cancelled, or when [`Migrator::close`] shuts down the whole migrator.
//! [`Migration::done`] fires only after every worker of the pool has exited.
//! The connection pools stay open until every started pool and transfer is
//! done, so ranges already in flight at close still finish.

mod transfer;
mod worker;

#[cfg(test)]
mod mock;

pub use transfer::Transfer;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use deadpool_postgres::Pool;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::db;
use crate::error::{MigrateError, Result};
use crate::gap::{Gap, GapKind};
use crate::range::{self, BlockRange};
use crate::source::{BlockReader, PgReader};
use crate::tables::TableName;
use crate::target::{BlockWriter, PageCopier, PgWriter};

use worker::{Sinks, Worker};

/// Gap policy and worker count shared by every table pool.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub workers_per_table: usize,
    /// Tables for which an empty read is a gap.
    pub must_exist: HashSet<TableName>,
    /// Report failed reads of any table as read gaps.
    pub gap_on_any_read_failure: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            workers_per_table: 1,
            must_exist: TableName::ALL
                .into_iter()
                .filter(|t| t.spec().must_exist)
                .collect(),
            gap_on_any_read_failure: false,
        }
    }
}

impl MigrationOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let migration = &config.migration;
        let mut must_exist = HashSet::new();
        for table in TableName::ALL {
            if migration.must_exist(table)? {
                must_exist.insert(table);
            }
        }
        Ok(Self {
            workers_per_table: migration.workers(),
            must_exist,
            gap_on_any_read_failure: migration.gap_on_any_read_failure,
        })
    }

    pub fn must_exist(&self, table: TableName) -> bool {
        self.must_exist.contains(&table)
    }

    /// Gap channel a failed read of `table` is reported on, if any.
    pub fn read_failure_gap(&self, table: TableName) -> Option<GapKind> {
        if self.must_exist(table) {
            return Some(GapKind::Read);
        }
        match table.spec().read_failure_gap {
            Some(GapKind::Write) => Some(GapKind::Write),
            _ if self.gap_on_any_read_failure => Some(GapKind::Read),
            _ => None,
        }
    }
}

/// Completion signal of a worker pool.
#[derive(Debug, Clone)]
pub struct Done(CancellationToken);

impl Done {
    /// Resolves once every worker of the pool has exited.
    pub async fn wait(&self) {
        self.0.cancelled().await
    }

    pub fn is_done(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Handles of one running table pool.
#[derive(Debug)]
pub struct Migration {
    pub table: TableName,
    /// Sub-ranges absent or unreadable in the old database.
    pub read_gaps: UnboundedReceiver<Gap>,
    /// Ranges that were read but could not be transformed or written.
    pub write_gaps: UnboundedReceiver<Gap>,
    pub errors: UnboundedReceiver<MigrateError>,
    pub done: Done,
    /// Stops this pool only; workers finish their current range first.
    pub quit: CancellationToken,
}

/// Owns both databases and runs table migrations and page transfers.
pub struct Migrator {
    reader: Arc<dyn BlockReader>,
    writer: Arc<dyn BlockWriter>,
    copier: Arc<dyn PageCopier>,
    options: MigrationOptions,
    close: CancellationToken,
    closed: AtomicBool,
    pools: Vec<Pool>,
    running: Mutex<Vec<Done>>,
}

impl Migrator {
    /// Connect to both databases described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = MigrationOptions::from_config(config)?;
        let old = db::connect(&config.old, config.pool_size(&config.old), "old").await?;
        let new = db::connect(&config.new, config.pool_size(&config.new), "new").await?;

        let writer = Arc::new(PgWriter::new(new.clone()));
        let mut migrator = Self::with_io(
            Arc::new(PgReader::new(old.clone())),
            writer.clone(),
            writer,
            options,
        );
        migrator.pools = vec![old, new];
        Ok(migrator)
    }

    /// Build a migrator over arbitrary reader and writer implementations.
    pub fn with_io(
        reader: Arc<dyn BlockReader>,
        writer: Arc<dyn BlockWriter>,
        copier: Arc<dyn PageCopier>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            reader,
            writer,
            copier,
            options,
            close: CancellationToken::new(),
            closed: AtomicBool::new(false),
            pools: Vec::new(),
            running: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Spawn the worker pool for `table` consuming `ranges`.
    pub fn migrate(
        &self,
        table: TableName,
        ranges: async_channel::Receiver<BlockRange>,
    ) -> Migration {
        let (read_tx, read_gaps) = mpsc::unbounded_channel();
        let (write_tx, write_gaps) = mpsc::unbounded_channel();
        let (err_tx, errors) = mpsc::unbounded_channel();
        let sinks = Sinks {
            read_gaps: read_tx,
            write_gaps: write_tx,
            errors: err_tx,
        };

        let quit = self.close.child_token();
        let done = CancellationToken::new();
        let transformer: Arc<dyn crate::transform::Transformer> = Arc::from(table.transformer());
        let workers = self.options.workers_per_table.max(1);

        info!("{}: starting {} workers", table, workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                table,
                reader: self.reader.clone(),
                writer: self.writer.clone(),
                transformer: transformer.clone(),
                must_exist: self.options.must_exist(table),
                read_failure_gap: self.options.read_failure_gap(table),
                ranges: ranges.clone(),
                quit: quit.clone(),
                sinks: sinks.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        drop(sinks);

        let finished = done.clone();
        tokio::spawn(async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("{}: worker task failed: {}", table, e);
                }
            }
            info!("{}: all workers finished", table);
            finished.cancel();
        });

        let done = Done(done);
        self.track(done.clone());
        Migration {
            table,
            read_gaps,
            write_gaps,
            errors,
            done,
            quit,
        }
    }

    /// Detect the indexed height range and split it into `segment_size`
    /// ranges.
    pub async fn auto_segment(&self, segment_size: u64) -> Result<Vec<BlockRange>> {
        let (min, max) = self.reader.block_height_bounds().await?;
        info!("detected block heights {} through {}", min, max);
        range::segment(segment_size, min, max)
    }

    /// Copy `public.blocks` page by page through the foreign table
    /// `fdw_table`, `segment_size` pages per transaction.
    ///
    /// Skips the first `segment_offset` segments. A `max_page` of zero is
    /// looked up on the foreign table. Setup errors are returned directly;
    /// per-segment failures arrive on the returned handles.
    pub async fn transfer(
        &self,
        fdw_table: &str,
        segment_size: u64,
        segment_offset: u64,
        max_page: u64,
    ) -> Result<Transfer> {
        let transfer = transfer::start(
            self.copier.clone(),
            self.close.clone(),
            fdw_table,
            segment_size,
            segment_offset,
            max_page,
        )
        .await?;
        self.track(transfer.done.clone());
        Ok(transfer)
    }

    fn track(&self, done: Done) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.retain(|d| !d.is_done());
        running.push(done);
    }

    /// Stop every pool and transfer, then close both connection pools once
    /// they have all finished. Later calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing migrator");
        self.close.cancel();
        if self.pools.is_empty() {
            return;
        }

        let running = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *running)
        };
        let pools = self.pools.clone();
        let close_pools = async move {
            for done in running {
                done.wait().await;
            }
            for pool in &pools {
                pool.close();
            }
            debug!("connection pools closed");
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close_pools);
            }
            Err(_) => {
                for pool in &self.pools {
                    pool.close();
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
