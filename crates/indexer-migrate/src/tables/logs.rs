use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::Result;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Logs,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, transaction_cids.tx_hash,
            log_cids.leaf_cid, log_cids.leaf_mh_key, log_cids.address, log_cids.index::BIGINT AS index,
            log_cids.log_data, log_cids.topic0, log_cids.topic1, log_cids.topic2, log_cids.topic3
        FROM eth.log_cids
        INNER JOIN eth.receipt_cids ON (log_cids.receipt_id = receipt_cids.id)
        INNER JOIN eth.transaction_cids ON (receipt_cids.tx_id = transaction_cids.id)
        INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.log_cids (rct_id, leaf_cid, leaf_mh_key, address, index, log_data,
            topic0, topic1, topic2, topic3)
        SELECT * FROM unnest($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::BIGINT[], $6::BYTEA[],
            $7::TEXT[], $8::TEXT[], $9::TEXT[], $10::TEXT[])
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogV2 {
    pub block_number: String,
    pub tx_hash: String,
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

/// v3 log row; `rct_id` is the hash of the transaction that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogV3 {
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

impl FromPgRow for LogV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            tx_hash: row.try_get("tx_hash")?,
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

impl ToColumns for LogV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.rct_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.leaf_cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.leaf_mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.address.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.index).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.log_data.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.topic0.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.topic1.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.topic2.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.topic3.clone()).collect::<Vec<_>>()),
        ]
    }
}

pub struct LogTransformer;

impl Transformer for LogTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let logs = match rows {
            OldRows::Logs(logs) => logs,
            other => return Err(mismatched_rows(TableName::Logs, expected, &other)),
        };
        let out = logs
            .into_iter()
            .map(|l| LogV3 {
                rct_id: l.tx_hash,
                leaf_cid: l.leaf_cid,
                leaf_mh_key: l.leaf_mh_key,
                address: l.address,
                index: l.index,
                log_data: l.log_data,
                topic0: l.topic0,
                topic1: l.topic1,
                topic2: l.topic2,
                topic3: l.topic3,
            })
            .collect();
        Ok(Transformed::complete(NewRows::Logs(out)))
    }
}
