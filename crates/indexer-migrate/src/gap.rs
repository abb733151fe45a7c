//! Gap records reported by migration workers.

use std::fmt;

use serde::Serialize;

use crate::range::BlockRange;

/// Which side of the pipeline lost the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Source had no usable data for the range, or reading it failed.
    Read,
    /// Transforming or writing the range failed.
    Write,
}

/// Why a range was reported as a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// The read query failed.
    ReadFailed,
    /// A must-exist table returned no rows for the range.
    EmptyRange,
    /// Heights were missing between rows that were read.
    Discontinuity,
    /// The transformer rejected the rows.
    TransformFailed,
    /// The bulk insert failed.
    WriteFailed,
}

impl GapReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapReason::ReadFailed => "read_failed",
            GapReason::EmptyRange => "empty_range",
            GapReason::Discontinuity => "discontinuity",
            GapReason::TransformFailed => "transform_failed",
            GapReason::WriteFailed => "write_failed",
        }
    }
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A range the pipeline could not completely migrate, tagged with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub range: BlockRange,
    pub reason: GapReason,
}

impl Gap {
    pub fn new(range: BlockRange, reason: GapReason) -> Self {
        Self { range, reason }
    }

    /// Line written to gap files: `"<start>, <stop>\r\n"`.
    pub fn to_record(&self) -> String {
        format!("{}, {}\r\n", self.range.start(), self.range.stop())
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.range, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_record_format() {
        let gap = Gap::new(BlockRange::new(102, 102), GapReason::Discontinuity);
        assert_eq!(gap.to_record(), "102, 102\r\n");
        assert_eq!(gap.to_string(), "[102, 102] (discontinuity)");
    }
}
