//! Block height ranges and range segmentation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// An inclusive `[start, stop]` span of block heights.
///
/// Serialized as a two element array so configuration files and gap records can
/// list ranges as `[start, stop]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u64; 2]", into = "[u64; 2]")]
pub struct BlockRange {
    start: u64,
    stop: u64,
}

impl BlockRange {
    /// Create a range. Panics in debug builds if `start > stop`; use
    /// [`BlockRange::try_new`] for untrusted input.
    pub fn new(start: u64, stop: u64) -> Self {
        debug_assert!(start <= stop, "range start {} > stop {}", start, stop);
        Self { start, stop }
    }

    /// Create a range, rejecting `start > stop`.
    pub fn try_new(start: u64, stop: u64) -> Result<Self> {
        if start > stop {
            return Err(MigrateError::Config(format!(
                "invalid range [{}, {}]: start is greater than stop",
                start, stop
            )));
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    /// Number of heights covered, saturating at `u64::MAX` for the full domain.
    pub fn len(&self) -> u64 {
        (self.stop - self.start).saturating_add(1)
    }

    /// A range always covers at least one height.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, height: u64) -> bool {
        self.start <= height && height <= self.stop
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

impl TryFrom<[u64; 2]> for BlockRange {
    type Error = MigrateError;

    fn try_from(value: [u64; 2]) -> Result<Self> {
        Self::try_new(value[0], value[1])
    }
}

impl From<BlockRange> for [u64; 2] {
    fn from(range: BlockRange) -> Self {
        [range.start, range.stop]
    }
}

/// Split `[start, stop]` into consecutive ranges of `chunk_size` heights.
///
/// Produces `span / chunk_size` full chunks followed by one shorter tail chunk
/// when the span does not divide evenly. The result partitions the input
/// exactly and is ordered ascending.
pub fn segment(chunk_size: u64, start: u64, stop: u64) -> Result<Vec<BlockRange>> {
    if chunk_size == 0 {
        return Err(MigrateError::Config(
            "segment size must be at least 1".into(),
        ));
    }
    let whole = BlockRange::try_new(start, stop)?;

    let span = (whole.stop - whole.start) as u128 + 1;
    let count = span.div_ceil(chunk_size as u128);
    let mut chunks = Vec::with_capacity(count.min(1 << 20) as usize);

    let mut cursor = whole.start;
    loop {
        let end = cursor.saturating_add(chunk_size - 1).min(whole.stop);
        chunks.push(BlockRange::new(cursor, end));
        if end == whole.stop {
            break;
        }
        cursor = end + 1;
    }

    Ok(chunks)
}
