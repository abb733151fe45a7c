use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::Result;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Receipts,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, transaction_cids.tx_hash,
            receipt_cids.leaf_cid, receipt_cids.leaf_mh_key,
            receipt_cids.post_status::BIGINT AS post_status, receipt_cids.post_state,
            receipt_cids.contract, receipt_cids.contract_hash, receipt_cids.log_root
        FROM eth.receipt_cids
        INNER JOIN eth.transaction_cids ON (receipt_cids.tx_id = transaction_cids.id)
        INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.receipt_cids (tx_id, leaf_cid, leaf_mh_key, post_status, post_state,
            contract, contract_hash, log_root)
        SELECT * FROM unnest($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::BIGINT[], $5::TEXT[],
            $6::TEXT[], $7::TEXT[], $8::TEXT[])
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptV2 {
    pub block_number: String,
    pub tx_hash: String,
    pub leaf_cid: String,
    pub leaf_mh_key: String,
    pub post_status: Option<i64>,
    pub post_state: Option<String>,
    pub contract: Option<String>,
    pub contract_hash: Option<String>,
    pub log_root: Option<String>,
}

/// Receipts reference their transaction by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptV3 {
    pub tx_id: String,
    pub leaf_cid: String,
    pub leaf_mh_key: String,
    pub post_status: Option<i64>,
    pub post_state: Option<String>,
    pub contract: Option<String>,
    pub contract_hash: Option<String>,
    pub log_root: Option<String>,
}

impl FromPgRow for ReceiptV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            tx_hash: row.try_get("tx_hash")?,
            leaf_cid: row.try_get("leaf_cid")?,
            leaf_mh_key: row.try_get("leaf_mh_key")?,
            post_status: row.try_get("post_status")?,
            post_state: row.try_get("post_state")?,
            contract: row.try_get("contract")?,
            contract_hash: row.try_get("contract_hash")?,
            log_root: row.try_get("log_root")?,
        })
    }
}

impl ToColumns for ReceiptV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.tx_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.leaf_cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.leaf_mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.post_status).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.post_state.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.contract.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.contract_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.log_root.clone()).collect::<Vec<_>>()),
        ]
    }
}

pub struct ReceiptTransformer;

impl Transformer for ReceiptTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let receipts = match rows {
            OldRows::Receipts(receipts) => receipts,
            other => return Err(mismatched_rows(TableName::Receipts, expected, &other)),
        };
        let out = receipts
            .into_iter()
            .map(|r| ReceiptV3 {
                tx_id: r.tx_hash,
                leaf_cid: r.leaf_cid,
                leaf_mh_key: r.leaf_mh_key,
                post_status: r.post_status,
                post_state: r.post_state,
                contract: r.contract,
                contract_hash: r.contract_hash,
                log_root: r.log_root,
            })
            .collect();
        Ok(Transformed::complete(NewRows::Receipts(out)))
    }
}
