//! Append-only gap files, one per table and gap kind.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use indexer_migrate::{Gap, Result};
use tracing::error;

/// `<dir>/<name>_<unix seconds>`, opened for appending.
pub struct GapFile {
    path: PathBuf,
    file: File,
}

impl GapFile {
    /// Create `dir` if missing and open the gap file for `name`.
    pub fn create(dir: &Path, name: &str, unix_secs: i64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_{}", name, unix_secs));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Failures are logged; the gap is still in the
    /// run summary.
    pub fn append(&mut self, gap: &Gap) {
        if let Err(e) = self.file.write_all(gap.to_record().as_bytes()) {
            error!("error writing gap {} to {}: {}", gap, self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_migrate::{BlockRange, GapReason};

    #[test]
    fn test_gap_file_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let gaps_dir = dir.path().join("readGaps");

        let mut file = GapFile::create(&gaps_dir, "header_cids", 1700000000).unwrap();
        file.append(&Gap::new(BlockRange::new(5, 9), GapReason::EmptyRange));
        file.append(&Gap::new(BlockRange::new(102, 102), GapReason::Discontinuity));
        assert_eq!(file.path(), gaps_dir.join("header_cids_1700000000"));
        drop(file);

        // reopening appends rather than truncating
        let mut file = GapFile::create(&gaps_dir, "header_cids", 1700000000).unwrap();
        file.append(&Gap::new(BlockRange::new(7, 7), GapReason::ReadFailed));

        let content = fs::read_to_string(gaps_dir.join("header_cids_1700000000")).unwrap();
        assert_eq!(content, "5, 9\r\n102, 102\r\n7, 7\r\n");
    }
}
