use tokio_postgres::Row;

use super::{parse_height, Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::encoding::header_coinbase;
use crate::error::{MigrateError, Result};
use crate::gap::GapKind;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, HeightTracker, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Headers,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, header_cids.block_hash,
            header_cids.parent_hash, header_cids.cid, header_cids.mh_key, header_cids.td::TEXT AS td,
            header_cids.node_id, header_cids.reward::TEXT AS reward, header_cids.state_root,
            header_cids.uncle_root, header_cids.tx_root, header_cids.receipt_root, header_cids.bloom,
            header_cids.timestamp::BIGINT AS timestamp,
            header_cids.times_validated::BIGINT AS times_validated, blocks.data
        FROM eth.header_cids
        INNER JOIN public.blocks ON (header_cids.mh_key = blocks.key)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.header_cids (block_number, block_hash, parent_hash, cid, mh_key, td,
            node_id, reward, state_root, uncle_root, tx_root, receipt_root, bloom, timestamp,
            times_validated, coinbase)
        SELECT block_number, block_hash, parent_hash, cid, mh_key, td::NUMERIC, node_id,
            reward::NUMERIC, state_root, uncle_root, tx_root, receipt_root, bloom, timestamp,
            times_validated, coinbase
        FROM unnest($1::BIGINT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::TEXT[], $6::TEXT[],
            $7::TEXT[], $8::TEXT[], $9::TEXT[], $10::TEXT[], $11::TEXT[], $12::TEXT[], $13::BYTEA[],
            $14::BIGINT[], $15::BIGINT[], $16::TEXT[])
            AS t(block_number, block_hash, parent_hash, cid, mh_key, td, node_id, reward, state_root,
                uncle_root, tx_root, receipt_root, bloom, timestamp, times_validated, coinbase)
        ON CONFLICT DO NOTHING",
    continuity: Continuity::Strict,
    must_exist: true,
    read_failure_gap: Some(GapKind::Read),
    height_segmented: true,
};

/// `eth.header_cids` row joined with its raw header from `public.blocks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderV2 {
    pub block_number: String,
    pub block_hash: String,
    pub parent_hash: String,
    pub cid: String,
    pub mh_key: String,
    pub td: String,
    pub node_id: String,
    pub reward: String,
    pub state_root: String,
    pub uncle_root: String,
    pub tx_root: String,
    pub receipt_root: String,
    pub bloom: Vec<u8>,
    pub timestamp: i64,
    pub times_validated: i64,
    /// RLP encoded header.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderV3 {
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub cid: String,
    pub mh_key: String,
    pub td: String,
    pub node_id: String,
    pub reward: String,
    pub state_root: String,
    pub uncle_root: String,
    pub tx_root: String,
    pub receipt_root: String,
    pub bloom: Vec<u8>,
    pub timestamp: i64,
    pub times_validated: i64,
    pub coinbase: String,
}

impl FromPgRow for HeaderV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            block_hash: row.try_get("block_hash")?,
            parent_hash: row.try_get("parent_hash")?,
            cid: row.try_get("cid")?,
            mh_key: row.try_get("mh_key")?,
            td: row.try_get("td")?,
            node_id: row.try_get("node_id")?,
            reward: row.try_get("reward")?,
            state_root: row.try_get("state_root")?,
            uncle_root: row.try_get("uncle_root")?,
            tx_root: row.try_get("tx_root")?,
            receipt_root: row.try_get("receipt_root")?,
            bloom: row.try_get("bloom")?,
            timestamp: row.try_get("timestamp")?,
            times_validated: row.try_get("times_validated")?,
            data: row.try_get("data")?,
        })
    }
}

impl ToColumns for HeaderV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.block_number).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.block_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.parent_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.td.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.node_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.reward.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.state_root.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.uncle_root.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.tx_root.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.receipt_root.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.bloom.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.timestamp).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.times_validated).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.coinbase.clone()).collect::<Vec<_>>()),
        ]
    }
}

/// Maps headers onto the v3 layout, derives the coinbase from the raw header
/// and reports heights with no header.
pub struct HeaderTransformer;

impl Transformer for HeaderTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let headers = match rows {
            OldRows::Headers(headers) => headers,
            other => return Err(mismatched_rows(TableName::Headers, expected, &other)),
        };
        let fail = |message: String| MigrateError::transform(TableName::Headers, expected, message);

        let mut tracker = HeightTracker::new(expected, SPEC.continuity);
        let mut out = Vec::with_capacity(headers.len());
        for header in headers {
            let height = parse_height(&header.block_number).map_err(fail)?;
            tracker.observe(height).map_err(fail)?;

            let coinbase = header_coinbase(&header.data)
                .map_err(|e| fail(format!("header {}: {}", header.block_hash, e)))?;
            let block_number = i64::try_from(height)
                .map_err(|_| fail(format!("block number {} exceeds BIGINT", height)))?;

            out.push(HeaderV3 {
                block_number,
                block_hash: header.block_hash,
                parent_hash: header.parent_hash,
                cid: header.cid,
                mh_key: header.mh_key,
                td: header.td,
                node_id: header.node_id,
                reward: header.reward,
                state_root: header.state_root,
                uncle_root: header.uncle_root,
                tx_root: header.tx_root,
                receipt_root: header.receipt_root,
                bloom: header.bloom,
                timestamp: header.timestamp,
                times_validated: header.times_validated,
                coinbase,
            });
        }

        Ok(Transformed::new(NewRows::Headers(out), tracker.finish()))
    }
}
