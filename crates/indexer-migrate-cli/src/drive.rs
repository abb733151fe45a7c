//! Feeding ranges to table pools and draining their gap and error channels.

use std::sync::Arc;

use chrono::Utc;
use indexer_migrate::{
    BlockRange, Config, Done, Gap, GapReason, MigrateError, Migration, Migrator, Result,
    TableName, TableReport, TransferReport,
};
use tracing::{info, warn};

use crate::gaps::GapFile;

/// Ranges every table pool receives, in order.
pub async fn plan_ranges(migrator: &Migrator, config: &Config) -> Result<Vec<BlockRange>> {
    let migration = &config.migration;
    let ranges = if migration.auto_range {
        let segment_size = migration.segment_size.ok_or_else(|| {
            MigrateError::Config("migration.segment_size is required for auto range".into())
        })?;
        info!("auto range detection is on, with segment size of {}", segment_size);
        migrator.auto_segment(segment_size).await?
    } else {
        migration.block_ranges()?
    };
    if ranges.is_empty() {
        return Err(MigrateError::Config(
            "no block ranges configured; set migration.ranges, start/stop or auto_range".into(),
        ));
    }
    Ok(ranges)
}

/// Run one pool per table over `ranges` and collect their reports.
pub async fn migrate(
    migrator: Arc<Migrator>,
    config: &Config,
    tables: &[TableName],
    ranges: &[BlockRange],
) -> Result<Vec<TableReport>> {
    let now = Utc::now().timestamp();
    let mut handles = Vec::with_capacity(tables.len());

    for &table in tables {
        let read_file = GapFile::create(&config.log.read_gaps_dir, table.as_str(), now)?;
        let write_file = GapFile::create(&config.log.write_gaps_dir, table.as_str(), now)?;

        // public.nodes is not height segmented and is copied in one pass
        let table_ranges = match table {
            TableName::PublicNodes => ranges.iter().take(1).copied().collect(),
            _ => ranges.to_vec(),
        };

        let (tx, rx) = async_channel::bounded(1);
        let migration = migrator.migrate(table, rx);
        let supplier = tokio::spawn(supply(table, tx, table_ranges, migration.done.clone()));

        handles.push(tokio::spawn(async move {
            let mut report = drain(migration, read_file, write_file).await;
            match supplier.await {
                Ok((sent, unsent)) => {
                    report.ranges_sent = sent;
                    report.ranges_unsent = unsent;
                }
                Err(e) => warn!("{}: range supplier failed: {}", table, e),
            }
            report
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (table, joined) in tables
        .iter()
        .zip(futures::future::join_all(handles).await)
    {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!("{}: drain task failed: {}", table, e);
                reports.push(TableReport::new(*table));
            }
        }
    }
    Ok(reports)
}

/// Push `ranges` until they run out or the pool stops, then close the
/// source so workers exit once the queue is empty.
async fn supply(
    table: TableName,
    tx: async_channel::Sender<BlockRange>,
    ranges: Vec<BlockRange>,
    done: Done,
) -> (usize, usize) {
    let total = ranges.len();
    let mut sent = 0;
    for range in ranges {
        tokio::select! {
            biased;
            _ = done.wait() => break,
            result = tx.send(range) => {
                if result.is_err() {
                    break;
                }
                sent += 1;
            }
        }
    }
    tx.close();

    if sent < total {
        info!("{}: pool stopped; {} of {} ranges unsent", table, total - sent, total);
    } else {
        info!("{}: finished sending {} ranges", table, sent);
    }
    (sent, total - sent)
}

/// Persist gaps and count errors until every worker has exited.
async fn drain(mut migration: Migration, mut read_file: GapFile, mut write_file: GapFile) -> TableReport {
    let table = migration.table;
    let mut report = TableReport::new(table);
    loop {
        tokio::select! {
            Some(gap) = migration.read_gaps.recv() => {
                info!("{} read gap: {}", table, gap);
                read_file.append(&gap);
                report.read_gaps.push(gap);
            }
            Some(gap) = migration.write_gaps.recv() => {
                info!("{} write gap: {}", table, gap);
                write_file.append(&gap);
                report.write_gaps.push(gap);
            }
            Some(_) = migration.errors.recv() => {
                report.errors += 1;
            }
            else => break,
        }
    }
    migration.done.wait().await;
    report
}

/// Run the configured page transfer and collect its report.
pub async fn transfer(migrator: &Migrator, config: &Config) -> Result<TransferReport> {
    let settings = &config.transfer;
    let mut gap_file = GapFile::create(
        &config.log.transfer_gaps_dir,
        &settings.table_name,
        Utc::now().timestamp(),
    )?;

    let mut transfer = migrator
        .transfer(
            &settings.table_name,
            settings.segment_size,
            settings.segment_offset,
            settings.max_page,
        )
        .await?;

    let mut report = TransferReport {
        table_name: settings.table_name.clone(),
        segments: transfer.segments,
        failed_segments: Vec::new(),
        errors: 0,
    };
    loop {
        tokio::select! {
            Some(pages) = transfer.failed_segments.recv() => {
                info!("{} failed page segment: {}", settings.table_name, pages);
                gap_file.append(&Gap::new(pages, GapReason::WriteFailed));
                report.failed_segments.push(pages);
            }
            Some(_) = transfer.errors.recv() => {
                report.errors += 1;
            }
            else => break,
        }
    }
    transfer.done.wait().await;
    Ok(report)
}
