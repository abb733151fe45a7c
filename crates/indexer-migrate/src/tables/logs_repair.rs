//! Re-supplies the IPLD blobs of v3 log rows whose blob is absent from
//! `public.blocks`.
//!
//! Each row's log is rebuilt from its own columns and re-encoded. The derived
//! blockstore key must equal the `leaf_mh_key` stored on the row; a mismatch
//! means the row itself is corrupt and the whole range is rejected.

use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::encoding::CanonicalLog;
use crate::error::{MigrateError, Result};
use crate::gap::GapKind;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::LogsRepair,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, log_cids.rct_id,
            log_cids.leaf_cid, log_cids.leaf_mh_key, log_cids.address, log_cids.index::BIGINT AS index,
            log_cids.log_data, log_cids.topic0, log_cids.topic1, log_cids.topic2, log_cids.topic3
        FROM eth.log_cids
        INNER JOIN eth.transaction_cids ON (log_cids.rct_id = transaction_cids.tx_hash)
        INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.block_hash)
        LEFT JOIN public.blocks ON (log_cids.leaf_mh_key = blocks.key)
        WHERE blocks.key IS NULL
            AND header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO public.blocks (key, data)
        SELECT * FROM unnest($1::TEXT[], $2::BYTEA[])
        ON CONFLICT (key) DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: Some(GapKind::Write),
    height_segmented: true,
};

/// A v3 `eth.log_cids` row as stored, with the height of its block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    pub block_number: String,
    pub rct_id: String,
    pub leaf_cid: String,
    pub leaf_mh_key: String,
    pub address: String,
    pub index: i64,
    pub log_data: Option<Vec<u8>>,
    pub topic0: Option<String>,
    pub topic1: Option<String>,
    pub topic2: Option<String>,
    pub topic3: Option<String>,
}

impl StoredLog {
    fn canonical(&self) -> std::result::Result<CanonicalLog, crate::encoding::CodecError> {
        CanonicalLog::from_columns(
            &self.address,
            [
                self.topic0.as_deref(),
                self.topic1.as_deref(),
                self.topic2.as_deref(),
                self.topic3.as_deref(),
            ],
            self.log_data.as_deref().unwrap_or_default(),
        )
    }
}

/// A content addressed `public.blocks` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpldBlock {
    pub key: String,
    pub data: Vec<u8>,
}

impl FromPgRow for StoredLog {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            rct_id: row.try_get("rct_id")?,
            leaf_cid: row.try_get("leaf_cid")?,
            leaf_mh_key: row.try_get("leaf_mh_key")?,
            address: row.try_get("address")?,
            index: row.try_get("index")?,
            log_data: row.try_get("log_data")?,
            topic0: row.try_get("topic0")?,
            topic1: row.try_get("topic1")?,
            topic2: row.try_get("topic2")?,
            topic3: row.try_get("topic3")?,
        })
    }
}

impl ToColumns for IpldBlock {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.data.clone()).collect::<Vec<_>>()),
        ]
    }
}

pub struct LogRepairTransformer;

impl Transformer for LogRepairTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let logs = match rows {
            OldRows::LogsRepair(logs) => logs,
            other => return Err(mismatched_rows(TableName::LogsRepair, expected, &other)),
        };
        let fail = |message: String| MigrateError::transform(TableName::LogsRepair, expected, message);

        let mut blocks = Vec::with_capacity(logs.len());
        for log in &logs {
            let canonical = log
                .canonical()
                .map_err(|e| fail(format!("log {}#{}: {}", log.rct_id, log.index, e)))?;
            let (data, key) = canonical.encode_with_key();
            if key != log.leaf_mh_key {
                return Err(fail(format!(
                    "log {}#{}: stored key {} does not match derived key {}",
                    log.rct_id, log.index, log.leaf_mh_key, key
                )));
            }
            blocks.push(IpldBlock { key, data });
        }

        Ok(Transformed::complete(NewRows::Blocks(blocks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::tests::{ADDRESS, TOPIC0, TOPIC1};

    fn stored_log(key: Option<String>) -> StoredLog {
        let data = b"transfer".to_vec();
        let derived = CanonicalLog::from_columns(ADDRESS, [Some(TOPIC0), Some(TOPIC1), None, None], &data)
            .unwrap()
            .encode_with_key()
            .1;
        StoredLog {
            block_number: "15000000".into(),
            rct_id: "0xtx".into(),
            leaf_cid: "bagmacgza".into(),
            leaf_mh_key: key.unwrap_or(derived),
            address: ADDRESS.into(),
            index: 0,
            log_data: Some(data),
            topic0: Some(TOPIC0.into()),
            topic1: Some(TOPIC1.into()),
            topic2: Some(String::new()),
            topic3: None,
        }
    }

    fn repair(logs: Vec<StoredLog>) -> Result<Transformed> {
        LogRepairTransformer.transform(OldRows::LogsRepair(logs), BlockRange::new(15000000, 15000000))
    }

    #[test]
    fn test_tampered_key_rejects_whole_range() {
        let tampered = stored_log(Some("/blocks/NOTTHEKEY".into()));
        let err = repair(vec![stored_log(None), tampered]).unwrap_err();
        assert!(matches!(err, MigrateError::Transform { .. }));
        assert!(err.to_string().contains("/blocks/NOTTHEKEY"));
    }

    #[test]
    fn test_correct_key_yields_one_blob() {
        let log = stored_log(None);
        let out = repair(vec![log.clone()]).unwrap();
        assert!(out.missing.is_empty());
        match out.rows {
            NewRows::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert_eq!(blocks[0].key, log.leaf_mh_key);
                assert_eq!(crate::encoding::blockstore_key(&blocks[0].data), log.leaf_mh_key);
            }
            other => panic!("unexpected rows {:?}", other),
        }
    }

    #[test]
    fn test_repair_is_idempotent() {
        let first = repair(vec![stored_log(None)]).unwrap();
        let second = repair(vec![stored_log(None)]).unwrap();
        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn test_unparseable_address_fails_range() {
        let mut log = stored_log(None);
        log.address = "not an address".into();
        assert!(repair(vec![log]).is_err());
    }

    #[test]
    fn test_empty_read_repairs_nothing() {
        let out = repair(vec![]).unwrap();
        assert!(out.rows.is_empty());
    }
}
