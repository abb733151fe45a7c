//! Transformer contract and block height continuity tracking.

use crate::error::{MigrateError, Result};
use crate::range::BlockRange;
use crate::tables::{NewRows, OldRows, TableName};

/// Rows converted to the v3 schema plus the heights found missing in them.
#[derive(Debug)]
pub struct Transformed {
    pub rows: NewRows,
    pub missing: Vec<BlockRange>,
}

impl Transformed {
    pub fn new(rows: NewRows, missing: Vec<BlockRange>) -> Self {
        Self { rows, missing }
    }

    /// Output with no continuity findings.
    pub fn complete(rows: NewRows) -> Self {
        Self::new(rows, Vec::new())
    }
}

/// Converts one table's old rows into new rows.
///
/// Implementations are pure: the same input always produces the same output.
/// Any error aborts the whole range.
pub trait Transformer: Send + Sync {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed>;
}

/// Error for a transformer handed another table's rows.
pub(crate) fn mismatched_rows(table: TableName, range: BlockRange, rows: &OldRows) -> MigrateError {
    MigrateError::transform(
        table,
        range,
        format!("expected {} rows, got {} rows", table, rows.table()),
    )
}

/// How rows of a table relate to block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// No per-height completeness requirement.
    None,
    /// Exactly one row per height.
    Strict,
    /// One or more rows per height, grouped in ascending order.
    Grouped,
}

/// Walks the heights of height-ascending rows and records the heights of the
/// expected range that no row covered.
#[derive(Debug)]
pub struct HeightTracker {
    range: BlockRange,
    continuity: Continuity,
    // u128 so the height after u64::MAX is representable
    expected: u128,
    last: Option<u64>,
    missing: Vec<BlockRange>,
}

impl HeightTracker {
    pub fn new(range: BlockRange, continuity: Continuity) -> Self {
        Self {
            range,
            continuity,
            expected: range.start() as u128,
            last: None,
            missing: Vec::new(),
        }
    }

    /// Record the height of the next row.
    ///
    /// Fails when heights go backwards or leave the expected range.
    pub fn observe(&mut self, height: u64) -> std::result::Result<(), String> {
        if self.continuity == Continuity::None {
            return Ok(());
        }
        if !self.range.contains(height) {
            return Err(format!(
                "row height {} is outside the requested range {}",
                height, self.range
            ));
        }
        if self.continuity == Continuity::Grouped && self.last == Some(height) {
            return Ok(());
        }

        let current = height as u128;
        if current < self.expected {
            return Err(format!(
                "row height {} is below the expected height {}; rows are not in ascending order",
                height, self.expected
            ));
        }
        if current > self.expected {
            self.missing
                .push(BlockRange::new(self.expected as u64, height - 1));
        }

        self.expected = current + 1;
        self.last = Some(height);
        Ok(())
    }

    /// Missing sub-ranges, including the tail after the last row.
    pub fn finish(mut self) -> Vec<BlockRange> {
        if self.continuity == Continuity::None {
            return Vec::new();
        }
        let stop = self.range.stop() as u128;
        if self.expected <= stop {
            self.missing
                .push(BlockRange::new(self.expected as u64, self.range.stop()));
        }
        self.missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(range: BlockRange, continuity: Continuity, heights: &[u64]) -> Vec<BlockRange> {
        let mut tracker = HeightTracker::new(range, continuity);
        for &h in heights {
            tracker.observe(h).unwrap();
        }
        tracker.finish()
    }

    #[test]
    fn test_complete_range_has_no_gaps() {
        let gaps = track(BlockRange::new(100, 104), Continuity::Strict, &[100, 101, 102, 103, 104]);
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_interior_gap() {
        let gaps = track(BlockRange::new(100, 104), Continuity::Strict, &[100, 101, 103, 104]);
        assert_eq!(gaps, vec![BlockRange::new(102, 102)]);
    }

    #[test]
    fn test_leading_and_trailing_gaps() {
        let gaps = track(BlockRange::new(10, 20), Continuity::Strict, &[13, 14, 18]);
        assert_eq!(
            gaps,
            vec![
                BlockRange::new(10, 12),
                BlockRange::new(15, 17),
                BlockRange::new(19, 20),
            ]
        );
    }

    #[test]
    fn test_gaps_are_complement_of_present_heights() {
        let range = BlockRange::new(0, 63);
        let present: Vec<u64> = (0..64).filter(|h| h % 3 == 0 || h % 7 == 0).collect();
        let gaps = track(range, Continuity::Strict, &present);

        let mut covered: Vec<u64> = gaps.iter().flat_map(|g| g.start()..=g.stop()).collect();
        covered.extend(&present);
        covered.sort_unstable();
        assert_eq!(covered, (0..64).collect::<Vec<_>>());
        for g in &gaps {
            assert!((g.start()..=g.stop()).all(|h| !present.contains(&h)));
        }
    }

    #[test]
    fn test_height_inversion_is_fatal() {
        let mut tracker = HeightTracker::new(BlockRange::new(0, 10), Continuity::Strict);
        tracker.observe(5).unwrap();
        assert!(tracker.observe(4).is_err());

        let mut tracker = HeightTracker::new(BlockRange::new(0, 10), Continuity::Strict);
        tracker.observe(5).unwrap();
        assert!(tracker.observe(5).is_err(), "strict tables allow one row per height");
    }

    #[test]
    fn test_grouped_rows_share_a_height() {
        let gaps = track(BlockRange::new(1, 4), Continuity::Grouped, &[1, 1, 1, 2, 4, 4]);
        assert_eq!(gaps, vec![BlockRange::new(3, 3)]);

        let mut tracker = HeightTracker::new(BlockRange::new(1, 4), Continuity::Grouped);
        tracker.observe(3).unwrap();
        assert!(tracker.observe(2).is_err());
    }

    #[test]
    fn test_height_outside_range_is_fatal() {
        let mut tracker = HeightTracker::new(BlockRange::new(10, 20), Continuity::Strict);
        assert!(tracker.observe(21).is_err());
        assert!(tracker.observe(9).is_err());
    }

    #[test]
    fn test_range_ending_at_u64_max() {
        let gaps = track(BlockRange::new(u64::MAX - 2, u64::MAX), Continuity::Strict, &[u64::MAX]);
        assert_eq!(gaps, vec![BlockRange::new(u64::MAX - 2, u64::MAX - 1)]);
    }

    #[test]
    fn test_no_continuity_never_reports() {
        let gaps = track(BlockRange::new(0, 100), Continuity::None, &[50, 3]);
        assert!(gaps.is_empty());
    }
}
