use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::Result;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Storage,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, header_cids.block_hash,
            state_cids.state_path, storage_cids.storage_path, storage_cids.storage_leaf_key,
            storage_cids.node_type::INTEGER AS node_type, storage_cids.cid, storage_cids.mh_key,
            storage_cids.diff
        FROM eth.storage_cids
        INNER JOIN eth.state_cids ON (storage_cids.state_id = state_cids.id)
        INNER JOIN eth.header_cids ON (state_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.storage_cids (header_id, state_path, storage_path, storage_leaf_key,
            node_type, cid, mh_key, diff)
        SELECT * FROM unnest($1::TEXT[], $2::BYTEA[], $3::BYTEA[], $4::TEXT[], $5::INTEGER[],
            $6::TEXT[], $7::TEXT[], $8::BOOLEAN[])
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageV2 {
    pub block_number: String,
    pub block_hash: String,
    pub state_path: Option<Vec<u8>>,
    pub storage_path: Option<Vec<u8>>,
    pub storage_leaf_key: Option<String>,
    pub node_type: i32,
    pub cid: String,
    pub mh_key: String,
    pub diff: bool,
}

/// v3 storage node; the parent state node is identified by header hash and
/// state path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageV3 {
    pub header_id: String,
    pub state_path: Option<Vec<u8>>,
    pub storage_path: Option<Vec<u8>>,
    pub storage_leaf_key: Option<String>,
    pub node_type: i32,
    pub cid: String,
    pub mh_key: String,
    pub diff: bool,
}

impl FromPgRow for StorageV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            block_hash: row.try_get("block_hash")?,
            state_path: row.try_get("state_path")?,
            storage_path: row.try_get("storage_path")?,
            storage_leaf_key: row.try_get("storage_leaf_key")?,
            node_type: row.try_get("node_type")?,
            cid: row.try_get("cid")?,
            mh_key: row.try_get("mh_key")?,
            diff: row.try_get("diff")?,
        })
    }
}

impl ToColumns for StorageV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.header_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.state_path.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.storage_path.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.storage_leaf_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.node_type).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.diff).collect::<Vec<_>>()),
        ]
    }
}

pub struct StorageTransformer;

impl Transformer for StorageTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let nodes = match rows {
            OldRows::Storage(nodes) => nodes,
            other => return Err(mismatched_rows(TableName::Storage, expected, &other)),
        };
        let out = nodes
            .into_iter()
            .map(|n| StorageV3 {
                header_id: n.block_hash,
                state_path: n.state_path,
                storage_path: n.storage_path,
                storage_leaf_key: n.storage_leaf_key,
                node_type: n.node_type,
                cid: n.cid,
                mh_key: n.mh_key,
                diff: n.diff,
            })
            .collect();
        Ok(Transformed::complete(NewRows::Storage(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_node_carries_state_path() {
        let node = StorageV2 {
            block_number: "2".into(),
            block_hash: "0xblock".into(),
            state_path: Some(vec![0x01, 0x02]),
            storage_path: Some(vec![0x0a]),
            storage_leaf_key: Some("0xleaf".into()),
            node_type: 2,
            cid: "cid".into(),
            mh_key: "/blocks/ST".into(),
            diff: true,
        };
        let out = StorageTransformer
            .transform(OldRows::Storage(vec![node]), BlockRange::new(0, 5))
            .unwrap();
        match out.rows {
            NewRows::Storage(rows) => {
                assert_eq!(rows[0].header_id, "0xblock");
                assert_eq!(rows[0].state_path, Some(vec![0x01, 0x02]));
                assert_eq!(rows[0].node_type, 2);
            }
            other => panic!("unexpected rows {:?}", other),
        }
        assert_eq!(StorageV3::to_columns(&[]).len(), 8);
    }
}
