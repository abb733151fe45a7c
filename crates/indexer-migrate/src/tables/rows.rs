//! Typed row buffers, one variant per table.

use tokio_postgres::Row;

use super::*;

/// Rows read from the v2 schema.
#[derive(Debug, Clone, PartialEq)]
pub enum OldRows {
    Nodes(Vec<NodeRow>),
    Headers(Vec<HeaderV2>),
    Uncles(Vec<UncleV2>),
    Transactions(Vec<TransactionV2>),
    AccessListElements(Vec<AccessListElementV2>),
    Receipts(Vec<ReceiptV2>),
    Logs(Vec<LogV2>),
    LogsRepair(Vec<StoredLog>),
    State(Vec<StateV2>),
    Accounts(Vec<AccountV2>),
    Storage(Vec<StorageV2>),
}

/// Rows ready to be written to the v3 schema.
#[derive(Debug, Clone, PartialEq)]
pub enum NewRows {
    Nodes(Vec<NodeRow>),
    Headers(Vec<HeaderV3>),
    Uncles(Vec<UncleV3>),
    Transactions(Vec<TransactionV3>),
    AccessListElements(Vec<AccessListElementV3>),
    Receipts(Vec<ReceiptV3>),
    Logs(Vec<LogV3>),
    Blocks(Vec<IpldBlock>),
    State(Vec<StateV3>),
    Accounts(Vec<AccountV3>),
    Storage(Vec<StorageV3>),
}

fn decode_all<T: FromPgRow>(rows: &[Row]) -> std::result::Result<Vec<T>, tokio_postgres::Error> {
    rows.iter().map(T::from_pg_row).collect()
}

impl OldRows {
    /// Decode the result of `table`'s read query.
    pub fn decode(table: TableName, rows: &[Row]) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(match table {
            TableName::PublicNodes => OldRows::Nodes(decode_all(rows)?),
            TableName::Headers => OldRows::Headers(decode_all(rows)?),
            TableName::Uncles => OldRows::Uncles(decode_all(rows)?),
            TableName::Transactions => OldRows::Transactions(decode_all(rows)?),
            TableName::AccessListElements => OldRows::AccessListElements(decode_all(rows)?),
            TableName::Receipts => OldRows::Receipts(decode_all(rows)?),
            TableName::Logs => OldRows::Logs(decode_all(rows)?),
            TableName::LogsRepair => OldRows::LogsRepair(decode_all(rows)?),
            TableName::State => OldRows::State(decode_all(rows)?),
            TableName::Accounts => OldRows::Accounts(decode_all(rows)?),
            TableName::Storage => OldRows::Storage(decode_all(rows)?),
        })
    }

    /// Table these rows were read for.
    pub fn table(&self) -> TableName {
        match self {
            OldRows::Nodes(_) => TableName::PublicNodes,
            OldRows::Headers(_) => TableName::Headers,
            OldRows::Uncles(_) => TableName::Uncles,
            OldRows::Transactions(_) => TableName::Transactions,
            OldRows::AccessListElements(_) => TableName::AccessListElements,
            OldRows::Receipts(_) => TableName::Receipts,
            OldRows::Logs(_) => TableName::Logs,
            OldRows::LogsRepair(_) => TableName::LogsRepair,
            OldRows::State(_) => TableName::State,
            OldRows::Accounts(_) => TableName::Accounts,
            OldRows::Storage(_) => TableName::Storage,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OldRows::Nodes(r) => r.len(),
            OldRows::Headers(r) => r.len(),
            OldRows::Uncles(r) => r.len(),
            OldRows::Transactions(r) => r.len(),
            OldRows::AccessListElements(r) => r.len(),
            OldRows::Receipts(r) => r.len(),
            OldRows::Logs(r) => r.len(),
            OldRows::LogsRepair(r) => r.len(),
            OldRows::State(r) => r.len(),
            OldRows::Accounts(r) => r.len(),
            OldRows::Storage(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NewRows {
    /// One array parameter per column of the table's write query.
    pub fn columns(&self) -> Vec<Column> {
        match self {
            NewRows::Nodes(r) => NodeRow::to_columns(r),
            NewRows::Headers(r) => HeaderV3::to_columns(r),
            NewRows::Uncles(r) => UncleV3::to_columns(r),
            NewRows::Transactions(r) => TransactionV3::to_columns(r),
            NewRows::AccessListElements(r) => AccessListElementV3::to_columns(r),
            NewRows::Receipts(r) => ReceiptV3::to_columns(r),
            NewRows::Logs(r) => LogV3::to_columns(r),
            NewRows::Blocks(r) => IpldBlock::to_columns(r),
            NewRows::State(r) => StateV3::to_columns(r),
            NewRows::Accounts(r) => AccountV3::to_columns(r),
            NewRows::Storage(r) => StorageV3::to_columns(r),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NewRows::Nodes(r) => r.len(),
            NewRows::Headers(r) => r.len(),
            NewRows::Uncles(r) => r.len(),
            NewRows::Transactions(r) => r.len(),
            NewRows::AccessListElements(r) => r.len(),
            NewRows::Receipts(r) => r.len(),
            NewRows::Logs(r) => r.len(),
            NewRows::Blocks(r) => r.len(),
            NewRows::State(r) => r.len(),
            NewRows::Accounts(r) => r.len(),
            NewRows::Storage(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
