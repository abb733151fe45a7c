use tokio_postgres::Row;

use super::{parse_height, Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::{MigrateError, Result};
use crate::gap::GapKind;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, HeightTracker, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::State,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, header_cids.block_hash,
            state_cids.state_path, state_cids.state_leaf_key, state_cids.node_type::INTEGER AS node_type,
            state_cids.cid, state_cids.mh_key, state_cids.diff
        FROM eth.state_cids
        INNER JOIN eth.header_cids ON (state_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.state_cids (header_id, state_path, state_leaf_key, node_type, cid,
            mh_key, diff)
        SELECT * FROM unnest($1::TEXT[], $2::BYTEA[], $3::TEXT[], $4::INTEGER[], $5::TEXT[],
            $6::TEXT[], $7::BOOLEAN[])
        ON CONFLICT DO NOTHING",
    continuity: Continuity::Grouped,
    must_exist: true,
    read_failure_gap: Some(GapKind::Read),
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateV2 {
    pub block_number: String,
    pub block_hash: String,
    pub state_path: Option<Vec<u8>>,
    pub state_leaf_key: Option<String>,
    pub node_type: i32,
    pub cid: String,
    pub mh_key: String,
    pub diff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateV3 {
    pub header_id: String,
    pub state_path: Option<Vec<u8>>,
    pub state_leaf_key: Option<String>,
    pub node_type: i32,
    pub cid: String,
    pub mh_key: String,
    pub diff: bool,
}

impl FromPgRow for StateV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            block_hash: row.try_get("block_hash")?,
            state_path: row.try_get("state_path")?,
            state_leaf_key: row.try_get("state_leaf_key")?,
            node_type: row.try_get("node_type")?,
            cid: row.try_get("cid")?,
            mh_key: row.try_get("mh_key")?,
            diff: row.try_get("diff")?,
        })
    }
}

impl ToColumns for StateV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.header_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.state_path.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.state_leaf_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.node_type).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.diff).collect::<Vec<_>>()),
        ]
    }
}

/// Maps state nodes onto the v3 layout. Every block touches state, so a height
/// with no state node is reported missing.
pub struct StateTransformer;

impl Transformer for StateTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let nodes = match rows {
            OldRows::State(nodes) => nodes,
            other => return Err(mismatched_rows(TableName::State, expected, &other)),
        };
        let fail = |message: String| MigrateError::transform(TableName::State, expected, message);

        let mut tracker = HeightTracker::new(expected, SPEC.continuity);
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            tracker
                .observe(parse_height(&node.block_number).map_err(fail)?)
                .map_err(fail)?;
            out.push(StateV3 {
                header_id: node.block_hash,
                state_path: node.state_path,
                state_leaf_key: node.state_leaf_key,
                node_type: node.node_type,
                cid: node.cid,
                mh_key: node.mh_key,
                diff: node.diff,
            });
        }

        Ok(Transformed::new(NewRows::State(out), tracker.finish()))
    }
}
