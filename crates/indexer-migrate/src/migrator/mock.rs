//! In-memory readers and writers for exercising worker pools.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{MigrateError, Result};
use crate::range::BlockRange;
use crate::source::BlockReader;
use crate::tables::{NewRows, OldRows, StateV2, TableName, UncleV2};
use crate::target::{BlockWriter, PageCopier};

type ReadFn = dyn Fn(TableName, BlockRange) -> Result<OldRows> + Send + Sync;

pub struct MockReader {
    read: Box<ReadFn>,
    bounds: std::result::Result<(u64, u64), String>,
    delay: Option<Duration>,
    reads: Mutex<Vec<BlockRange>>,
}

impl MockReader {
    pub fn new<F>(read: F) -> Self
    where
        F: Fn(TableName, BlockRange) -> Result<OldRows> + Send + Sync + 'static,
    {
        Self {
            read: Box::new(read),
            bounds: Ok((0, 0)),
            delay: None,
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_bounds(mut self, bounds: std::result::Result<(u64, u64), String>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn reads(&self) -> Vec<BlockRange> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockReader for MockReader {
    async fn read(&self, table: TableName, range: BlockRange) -> Result<OldRows> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reads.lock().unwrap().push(range);
        (self.read)(table, range)
    }

    async fn block_height_bounds(&self) -> Result<(u64, u64)> {
        self.bounds.clone().map_err(MigrateError::RangeDetection)
    }
}

#[derive(Default)]
pub struct MockWriter {
    fail: HashSet<BlockRange>,
    writes: Mutex<Vec<(TableName, BlockRange, usize)>>,
}

impl MockWriter {
    pub fn failing_on(range: BlockRange) -> Self {
        Self {
            fail: [range].into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<(TableName, BlockRange, usize)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockWriter for MockWriter {
    async fn write(&self, table: TableName, range: BlockRange, rows: &NewRows) -> Result<u64> {
        if self.fail.contains(&range) {
            return Err(MigrateError::write(table, range, "duplicate key value"));
        }
        self.writes.lock().unwrap().push((table, range, rows.len()));
        Ok(rows.len() as u64)
    }
}

pub struct MockCopier {
    max_page: u64,
    fail: HashSet<BlockRange>,
    copies: Mutex<Vec<BlockRange>>,
}

impl MockCopier {
    pub fn new(max_page: u64) -> Self {
        Self {
            max_page,
            fail: HashSet::new(),
            copies: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, pages: BlockRange) -> Self {
        self.fail.insert(pages);
        self
    }

    pub fn copies(&self) -> Vec<BlockRange> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageCopier for MockCopier {
    async fn max_page(&self, fdw_table: &str) -> Result<u64> {
        if self.max_page == 0 {
            return Err(MigrateError::RangeDetection(format!(
                "foreign table {} has no rows",
                fdw_table
            )));
        }
        Ok(self.max_page)
    }

    async fn copy_pages(&self, fdw_table: &str, pages: BlockRange) -> Result<u64> {
        if self.fail.contains(&pages) {
            return Err(MigrateError::Transfer {
                table: fdw_table.to_string(),
                pages,
                message: "could not serialize access".into(),
            });
        }
        self.copies.lock().unwrap().push(pages);
        Ok(pages.len())
    }
}

pub fn uncle_rows(heights: RangeInclusive<u64>) -> OldRows {
    OldRows::Uncles(
        heights
            .map(|h| UncleV2 {
                block_number: h.to_string(),
                header_hash: format!("0xheader{}", h),
                block_hash: format!("0xuncle{}", h),
                parent_hash: format!("0xparent{}", h),
                cid: "cid".into(),
                mh_key: "/blocks/U".into(),
                reward: "2000000000000000000".into(),
            })
            .collect(),
    )
}

pub fn state_rows(heights: &[u64]) -> OldRows {
    OldRows::State(
        heights
            .iter()
            .map(|h| StateV2 {
                block_number: h.to_string(),
                block_hash: format!("0xblock{}", h),
                state_path: Some(vec![0]),
                state_leaf_key: None,
                node_type: 2,
                cid: "cid".into(),
                mh_key: "/blocks/S".into(),
                diff: true,
            })
            .collect(),
    )
}

/// Everything currently buffered on `rx`.
pub fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}
