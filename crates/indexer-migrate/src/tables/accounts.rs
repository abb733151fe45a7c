use tokio_postgres::Row;

use super::{parse_height, Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::{MigrateError, Result};
use crate::gap::GapKind;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, HeightTracker, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Accounts,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, header_cids.block_hash,
            state_cids.state_path, state_accounts.balance::TEXT AS balance,
            state_accounts.nonce::BIGINT AS nonce, state_accounts.code_hash, state_accounts.storage_root
        FROM eth.state_accounts
        INNER JOIN eth.state_cids ON (state_accounts.state_id = state_cids.id)
        INNER JOIN eth.header_cids ON (state_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.state_accounts (header_id, state_path, balance, nonce, code_hash,
            storage_root)
        SELECT header_id, state_path, balance::NUMERIC, nonce, code_hash, storage_root
        FROM unnest($1::TEXT[], $2::BYTEA[], $3::TEXT[], $4::BIGINT[], $5::BYTEA[], $6::TEXT[])
            AS t(header_id, state_path, balance, nonce, code_hash, storage_root)
        ON CONFLICT DO NOTHING",
    continuity: Continuity::Grouped,
    must_exist: true,
    read_failure_gap: Some(GapKind::Read),
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountV2 {
    pub block_number: String,
    pub block_hash: String,
    pub state_path: Option<Vec<u8>>,
    pub balance: String,
    pub nonce: i64,
    pub code_hash: Vec<u8>,
    pub storage_root: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountV3 {
    pub header_id: String,
    pub state_path: Option<Vec<u8>>,
    pub balance: String,
    pub nonce: i64,
    pub code_hash: Vec<u8>,
    pub storage_root: String,
}

impl FromPgRow for AccountV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            block_hash: row.try_get("block_hash")?,
            state_path: row.try_get("state_path")?,
            balance: row.try_get("balance")?,
            nonce: row.try_get("nonce")?,
            code_hash: row.try_get("code_hash")?,
            storage_root: row.try_get("storage_root")?,
        })
    }
}

impl ToColumns for AccountV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.header_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.state_path.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.balance.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.nonce).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.code_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.storage_root.clone()).collect::<Vec<_>>()),
        ]
    }
}

pub struct AccountTransformer;

impl Transformer for AccountTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let accounts = match rows {
            OldRows::Accounts(accounts) => accounts,
            other => return Err(mismatched_rows(TableName::Accounts, expected, &other)),
        };
        let fail = |message: String| MigrateError::transform(TableName::Accounts, expected, message);

        let mut tracker = HeightTracker::new(expected, SPEC.continuity);
        let mut out = Vec::with_capacity(accounts.len());
        for account in accounts {
            let height = parse_height(&account.block_number)
                .map_err(|e| fail(format!("account at {}: {}", account.block_hash, e)))?;
            tracker.observe(height).map_err(fail)?;
            out.push(AccountV3 {
                header_id: account.block_hash,
                state_path: account.state_path,
                balance: account.balance,
                nonce: account.nonce,
                code_hash: account.code_hash,
                storage_root: account.storage_root,
            });
        }

        Ok(Transformed::new(NewRows::Accounts(out), tracker.finish()))
    }
}
