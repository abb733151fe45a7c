//! Table catalog: names, queries and row models for every migrated table.
//!
//! Each [`TableName`] maps to one immutable [`TableSpec`] holding its read
//! query against the v2 schema, its bulk insert against the v3 schema and the
//! gap policy used by migration workers. Row models live in one submodule per
//! table together with the transformer converting them.

mod access_lists;
mod accounts;
mod headers;
mod logs;
mod logs_repair;
mod nodes;
mod receipts;
mod rows;
mod state;
mod storage;
mod transactions;
mod uncles;

pub use access_lists::{AccessListElementV2, AccessListElementV3, AccessListTransformer};
pub use accounts::{AccountV2, AccountV3, AccountTransformer};
pub use headers::{HeaderTransformer, HeaderV2, HeaderV3};
pub use logs::{LogTransformer, LogV2, LogV3};
pub use logs_repair::{IpldBlock, LogRepairTransformer, StoredLog};
pub use nodes::{NodeRow, NodeTransformer};
pub use receipts::{ReceiptTransformer, ReceiptV2, ReceiptV3};
pub use rows::{NewRows, OldRows};
pub use state::{StateTransformer, StateV2, StateV3};
pub use storage::{StorageTransformer, StorageV2, StorageV3};
pub use transactions::{TransactionTransformer, TransactionV2, TransactionV3};
pub use uncles::{UncleTransformer, UncleV2, UncleV3};

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::error::{MigrateError, Result};
use crate::gap::GapKind;
use crate::transform::{Continuity, Transformer};

/// One bound array parameter of a bulk insert.
pub type Column = Box<dyn ToSql + Sync + Send>;

/// Decode one result row of a table's read query.
pub trait FromPgRow: Sized {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error>;
}

/// Bind a batch of rows as one array per column of a table's write query.
pub trait ToColumns: Sized {
    fn to_columns(rows: &[Self]) -> Vec<Column>;
}

/// Tables the migrator knows how to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    PublicNodes,
    Headers,
    Uncles,
    Transactions,
    AccessListElements,
    Receipts,
    Logs,
    LogsRepair,
    State,
    Accounts,
    Storage,
}

impl TableName {
    pub const ALL: [TableName; 11] = [
        TableName::PublicNodes,
        TableName::Headers,
        TableName::Uncles,
        TableName::Transactions,
        TableName::AccessListElements,
        TableName::Receipts,
        TableName::Logs,
        TableName::LogsRepair,
        TableName::State,
        TableName::Accounts,
        TableName::Storage,
    ];

    /// Canonical name, used in logs and gap file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::PublicNodes => "nodes",
            TableName::Headers => "header_cids",
            TableName::Uncles => "uncle_cids",
            TableName::Transactions => "transaction_cids",
            TableName::AccessListElements => "access_list_elements",
            TableName::Receipts => "receipt_cids",
            TableName::Logs => "log_cids",
            TableName::LogsRepair => "log_cids_repair",
            TableName::State => "state_cids",
            TableName::Accounts => "state_accounts",
            TableName::Storage => "storage_cids",
        }
    }

    /// Catalog entry for this table.
    pub fn spec(&self) -> &'static TableSpec {
        match self {
            TableName::PublicNodes => &nodes::SPEC,
            TableName::Headers => &headers::SPEC,
            TableName::Uncles => &uncles::SPEC,
            TableName::Transactions => &transactions::SPEC,
            TableName::AccessListElements => &access_lists::SPEC,
            TableName::Receipts => &receipts::SPEC,
            TableName::Logs => &logs::SPEC,
            TableName::LogsRepair => &logs_repair::SPEC,
            TableName::State => &state::SPEC,
            TableName::Accounts => &accounts::SPEC,
            TableName::Storage => &storage::SPEC,
        }
    }

    /// Transformer converting this table's old rows into new rows.
    pub fn transformer(&self) -> Box<dyn Transformer> {
        match self {
            TableName::PublicNodes => Box::new(NodeTransformer),
            TableName::Headers => Box::new(HeaderTransformer),
            TableName::Uncles => Box::new(UncleTransformer),
            TableName::Transactions => Box::new(TransactionTransformer),
            TableName::AccessListElements => Box::new(AccessListTransformer),
            TableName::Receipts => Box::new(ReceiptTransformer),
            TableName::Logs => Box::new(LogTransformer),
            TableName::LogsRepair => Box::new(LogRepairTransformer),
            TableName::State => Box::new(StateTransformer),
            TableName::Accounts => Box::new(AccountTransformer),
            TableName::Storage => Box::new(StorageTransformer),
        }
    }
}

impl FromStr for TableName {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let table = match s.trim().to_lowercase().as_str() {
            "public.nodes" | "nodes" | "public-nodes" => TableName::PublicNodes,
            "eth.header_cids" | "header_cids" | "headers" => TableName::Headers,
            "eth.uncle_cids" | "uncle_cids" | "uncles" => TableName::Uncles,
            "eth.transaction_cids" | "transaction_cids" | "transactions" | "txs" | "trxs" => {
                TableName::Transactions
            }
            "eth.access_list_elements" | "access_list_elements" | "access_list"
            | "access-list-elements" => TableName::AccessListElements,
            "eth.receipt_cids" | "receipt_cids" | "receipts" | "rcts" => TableName::Receipts,
            "eth.log_cids" | "log_cids" | "logs" => TableName::Logs,
            "eth.log_cids.repair" | "log_cids_repair" | "log_repair" | "logs-repair" => {
                TableName::LogsRepair
            }
            "eth.state_cids" | "state_cids" | "state" => TableName::State,
            "eth.state_accounts" | "state_accounts" | "accounts" => TableName::Accounts,
            "eth.storage_cids" | "storage_cids" | "storage" => TableName::Storage,
            _ => return Err(MigrateError::UnknownTable(s.to_string())),
        };
        Ok(table)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TableName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Static description of how one table is migrated.
#[derive(Debug)]
pub struct TableSpec {
    pub name: TableName,
    /// Select against the v2 schema; `$1`/`$2` bound the block height unless
    /// the table is not height segmented.
    pub read_query: &'static str,
    /// Bulk insert against the v3 schema taking one array per column.
    pub write_query: &'static str,
    pub continuity: Continuity,
    /// Every height must produce at least one row, so an empty read is a gap.
    pub must_exist: bool,
    /// Gap channel a failed read is reported on.
    pub read_failure_gap: Option<GapKind>,
    /// Whether the read query is bounded by block height.
    pub height_segmented: bool,
}

/// Parse a text block number column.
pub(crate) fn parse_height(raw: &str) -> std::result::Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| format!("unparseable block number '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_aliases() {
        let cases = [
            ("headers", TableName::Headers),
            ("eth.header_cids", TableName::Headers),
            ("HEADER_CIDS", TableName::Headers),
            ("public-nodes", TableName::PublicNodes),
            ("public.nodes", TableName::PublicNodes),
            ("trxs", TableName::Transactions),
            ("txs", TableName::Transactions),
            ("access-list-elements", TableName::AccessListElements),
            ("access_list", TableName::AccessListElements),
            ("rcts", TableName::Receipts),
            ("logs", TableName::Logs),
            ("logs-repair", TableName::LogsRepair),
            ("eth.log_cids.repair", TableName::LogsRepair),
            ("state", TableName::State),
            ("accounts", TableName::Accounts),
            ("storage", TableName::Storage),
            ("uncles", TableName::Uncles),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<TableName>().unwrap(), expected, "alias {}", input);
        }
    }

    #[test]
    fn test_unknown_table_name() {
        let err = "blocks".parse::<TableName>().unwrap_err();
        assert!(matches!(err, MigrateError::UnknownTable(ref s) if s == "blocks"));
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for table in TableName::ALL {
            assert_eq!(table.as_str().parse::<TableName>().unwrap(), table);
            assert_eq!(table.spec().name, table);
        }
    }

    #[test]
    fn test_must_exist_tables() {
        let must_exist: Vec<_> = TableName::ALL
            .into_iter()
            .filter(|t| t.spec().must_exist)
            .collect();
        assert_eq!(
            must_exist,
            vec![TableName::Headers, TableName::State, TableName::Accounts]
        );
    }

    #[test]
    fn test_only_nodes_are_unsegmented() {
        for table in TableName::ALL {
            let spec = table.spec();
            assert_eq!(spec.height_segmented, table != TableName::PublicNodes);
            if spec.height_segmented {
                assert!(spec.read_query.contains("BETWEEN $1 AND $2"), "{}", table);
            }
        }
    }

    #[test]
    fn test_repair_reports_read_failures_as_write_gaps() {
        assert_eq!(
            TableName::LogsRepair.spec().read_failure_gap,
            Some(GapKind::Write)
        );
        assert_eq!(TableName::Headers.spec().read_failure_gap, Some(GapKind::Read));
        assert_eq!(TableName::Logs.spec().read_failure_gap, None);
    }

    #[test]
    fn test_parse_height() {
        assert_eq!(parse_height("102").unwrap(), 102);
        assert_eq!(parse_height(" 7 ").unwrap(), 7);
        assert!(parse_height("0x10").is_err());
        assert!(parse_height("").is_err());
    }
}
