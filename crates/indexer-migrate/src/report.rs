//! Run summaries printed at the end of a migration or transfer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::gap::Gap;
use crate::range::BlockRange;
use crate::tables::TableName;

/// Outcome of one table pool.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: TableName,
    pub ranges_sent: usize,
    /// Ranges never handed to a worker because the pool stopped first.
    pub ranges_unsent: usize,
    pub read_gaps: Vec<Gap>,
    pub write_gaps: Vec<Gap>,
    pub errors: usize,
}

impl TableReport {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            ranges_sent: 0,
            ranges_unsent: 0,
            read_gaps: Vec::new(),
            write_gaps: Vec::new(),
            errors: 0,
        }
    }

    pub fn has_gaps(&self) -> bool {
        !self.read_gaps.is_empty() || !self.write_gaps.is_empty()
    }

    /// Total heights covered by gaps on both sides.
    pub fn gap_heights(&self) -> u64 {
        self.read_gaps
            .iter()
            .chain(&self.write_gaps)
            .map(|g| g.range.len())
            .sum()
    }
}

/// Outcome of a page transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub table_name: String,
    pub segments: usize,
    pub failed_segments: Vec<BlockRange>,
    pub errors: usize,
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Subcommand that produced the report.
    pub command: String,

    /// completed | completed_with_gaps | cancelled
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Fingerprint of the effective configuration.
    pub config_hash: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferReport>,
}

impl RunReport {
    pub fn new(command: &str, config_hash: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            status: "running".to_string(),
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            config_hash,
            tables: Vec::new(),
            transfer: None,
        }
    }

    pub fn has_gaps(&self) -> bool {
        self.tables.iter().any(TableReport::has_gaps)
            || self
                .transfer
                .as_ref()
                .is_some_and(|t| !t.failed_segments.is_empty())
    }

    /// Stamp completion time and derive the final status.
    pub fn finish(&mut self, cancelled: bool) {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.status = if cancelled {
            "cancelled"
        } else if self.has_gaps() {
            "completed_with_gaps"
        } else {
            "completed"
        }
        .to_string();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Latency of one database probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub old_latency_ms: u64,
    pub new_latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::GapReason;

    #[test]
    fn test_status_reflects_gaps() {
        let mut report = RunReport::new("migrate", "abc".into(), Utc::now());
        let mut table = TableReport::new(TableName::Headers);
        table.ranges_sent = 4;
        report.tables.push(table);
        report.finish(false);
        assert_eq!(report.status, "completed");

        report.tables[0]
            .read_gaps
            .push(Gap::new(BlockRange::new(5, 9), GapReason::EmptyRange));
        report.tables[0]
            .write_gaps
            .push(Gap::new(BlockRange::new(20, 20), GapReason::WriteFailed));
        report.finish(false);
        assert_eq!(report.status, "completed_with_gaps");
        assert_eq!(report.tables[0].gap_heights(), 6);

        report.finish(true);
        assert_eq!(report.status, "cancelled");
    }

    #[test]
    fn test_failed_transfer_segments_count_as_gaps() {
        let mut report = RunReport::new("transfer", "abc".into(), Utc::now());
        report.transfer = Some(TransferReport {
            table_name: "v2db_public_blocks".into(),
            segments: 3,
            failed_segments: vec![BlockRange::new(1000, 1999)],
            errors: 1,
        });
        assert!(report.has_gaps());
    }

    #[test]
    fn test_json_uses_canonical_names() {
        let mut report = RunReport::new("migrate", "abc".into(), Utc::now());
        let mut table = TableReport::new(TableName::Accounts);
        table
            .read_gaps
            .push(Gap::new(BlockRange::new(1, 2), GapReason::Discontinuity));
        report.tables.push(table);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"table\": \"state_accounts\""));
        assert!(json.contains("\"reason\": \"discontinuity\""));
        assert!(!json.contains("\"transfer\""));
    }
}
