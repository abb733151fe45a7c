use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::Result;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Uncles,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number,
            header_cids.block_hash AS header_hash, uncle_cids.block_hash, uncle_cids.parent_hash,
            uncle_cids.cid, uncle_cids.mh_key, uncle_cids.reward::TEXT AS reward
        FROM eth.uncle_cids
        INNER JOIN eth.header_cids ON (uncle_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.uncle_cids (header_id, block_hash, parent_hash, cid, mh_key, reward)
        SELECT header_id, block_hash, parent_hash, cid, mh_key, reward::NUMERIC
        FROM unnest($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::TEXT[], $6::TEXT[])
            AS t(header_id, block_hash, parent_hash, cid, mh_key, reward)
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncleV2 {
    pub block_number: String,
    pub header_hash: String,
    pub block_hash: String,
    pub parent_hash: String,
    pub cid: String,
    pub mh_key: String,
    pub reward: String,
}

/// Uncles reference their header by hash instead of serial id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncleV3 {
    pub header_id: String,
    pub block_hash: String,
    pub parent_hash: String,
    pub cid: String,
    pub mh_key: String,
    pub reward: String,
}

impl FromPgRow for UncleV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            header_hash: row.try_get("header_hash")?,
            block_hash: row.try_get("block_hash")?,
            parent_hash: row.try_get("parent_hash")?,
            cid: row.try_get("cid")?,
            mh_key: row.try_get("mh_key")?,
            reward: row.try_get("reward")?,
        })
    }
}

impl ToColumns for UncleV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.header_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.block_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.parent_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.reward.clone()).collect::<Vec<_>>()),
        ]
    }
}

pub struct UncleTransformer;

impl Transformer for UncleTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let uncles = match rows {
            OldRows::Uncles(uncles) => uncles,
            other => return Err(mismatched_rows(TableName::Uncles, expected, &other)),
        };
        let out = uncles
            .into_iter()
            .map(|u| UncleV3 {
                header_id: u.header_hash,
                block_hash: u.block_hash,
                parent_hash: u.parent_hash,
                cid: u.cid,
                mh_key: u.mh_key,
                reward: u.reward,
            })
            .collect();
        Ok(Transformed::complete(NewRows::Uncles(out)))
    }
}
