use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::Result;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::PublicNodes,
    read_query: "SELECT client_name, genesis_block, network_id, node_id, chain_id::INTEGER AS chain_id
        FROM public.nodes",
    write_query: "INSERT INTO public.nodes (client_name, genesis_block, network_id, node_id, chain_id)
        SELECT * FROM unnest($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::INTEGER[])
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: false,
};

/// A row of `public.nodes`; the layout is unchanged between schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub client_name: String,
    pub genesis_block: String,
    pub network_id: String,
    pub node_id: String,
    pub chain_id: Option<i32>,
}

impl FromPgRow for NodeRow {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            client_name: row.try_get("client_name")?,
            genesis_block: row.try_get("genesis_block")?,
            network_id: row.try_get("network_id")?,
            node_id: row.try_get("node_id")?,
            chain_id: row.try_get("chain_id")?,
        })
    }
}

impl ToColumns for NodeRow {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.client_name.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.genesis_block.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.network_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.node_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.chain_id).collect::<Vec<_>>()),
        ]
    }
}

/// Copies node rows unchanged.
pub struct NodeTransformer;

impl Transformer for NodeTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        match rows {
            OldRows::Nodes(nodes) => Ok(Transformed::complete(NewRows::Nodes(nodes))),
            other => Err(mismatched_rows(TableName::PublicNodes, expected, &other)),
        }
    }
}
