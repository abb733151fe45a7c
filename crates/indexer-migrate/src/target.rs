//! Writing rows and copying blob pages into the new database.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::range::BlockRange;
use crate::tables::{NewRows, TableName};

/// Destination side of a migration.
#[async_trait]
pub trait BlockWriter: Send + Sync {
    /// Bulk insert `rows` with `table`'s write query, returning rows affected.
    async fn write(&self, table: TableName, range: BlockRange, rows: &NewRows) -> Result<u64>;
}

/// Page level copy of `public.blocks` through a foreign table.
#[async_trait]
pub trait PageCopier: Send + Sync {
    /// Highest heap page of the foreign table.
    async fn max_page(&self, fdw_table: &str) -> Result<u64>;

    /// Copy every tuple of the pages in `pages`, in one transaction.
    async fn copy_pages(&self, fdw_table: &str, pages: BlockRange) -> Result<u64>;
}

/// [`BlockWriter`] and [`PageCopier`] over a deadpool-postgres pool.
pub struct PgWriter {
    pool: Pool,
}

impl PgWriter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockWriter for PgWriter {
    async fn write(&self, table: TableName, range: BlockRange, rows: &NewRows) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let fail = |e: &dyn std::fmt::Display| MigrateError::write(table, range, e);

        let columns = rows.columns();
        let params: Vec<&(dyn ToSql + Sync)> = columns
            .iter()
            .map(|c| &**c as &(dyn ToSql + Sync))
            .collect();

        let client = self.pool.get().await.map_err(|e| fail(&e))?;
        let stmt = client
            .prepare_cached(table.spec().write_query)
            .await
            .map_err(|e| fail(&e))?;
        let written = client.execute(&stmt, &params).await.map_err(|e| fail(&e))?;

        debug!("{}: wrote {} of {} rows for {}", table, written, rows.len(), range);
        Ok(written)
    }
}

/// Quote a PostgreSQL identifier, keeping an optional schema qualifier.
fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn max_page_query(fdw_table: &str) -> String {
    format!("SELECT MAX(ctid)::TEXT FROM {}", quote_ident(fdw_table))
}

/// Insert every tuple slot of one heap page. `block_size / 4` bounds the
/// number of line pointers a page can hold.
fn copy_page_query(fdw_table: &str) -> String {
    format!(
        "INSERT INTO public.blocks (key, data)
        SELECT key, data FROM {}
        WHERE ctid = ANY (ARRAY(
            SELECT ('(' || $1::BIGINT || ',' || s.i || ')')::tid
            FROM generate_series(0, current_setting('block_size')::int / 4) AS s(i)
        ))
        ON CONFLICT (key) DO NOTHING",
        quote_ident(fdw_table)
    )
}

/// Page number of a `(page,tuple)` ctid.
fn parse_ctid_page(ctid: &str) -> Option<u64> {
    let inner = ctid.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (page, tuple) = inner.split_once(',')?;
    tuple.trim().parse::<u64>().ok()?;
    page.trim().parse().ok()
}

#[async_trait]
impl PageCopier for PgWriter {
    async fn max_page(&self, fdw_table: &str) -> Result<u64> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "querying foreign table max page"))?;
        let row = client.query_one(max_page_query(fdw_table).as_str(), &[]).await?;
        let ctid: Option<String> = row.try_get(0)?;
        let ctid = ctid.ok_or_else(|| {
            MigrateError::RangeDetection(format!("foreign table {} has no rows", fdw_table))
        })?;
        parse_ctid_page(&ctid).ok_or_else(|| {
            MigrateError::RangeDetection(format!("unparseable ctid '{}' from {}", ctid, fdw_table))
        })
    }

    async fn copy_pages(&self, fdw_table: &str, pages: BlockRange) -> Result<u64> {
        let fail = |e: &dyn std::fmt::Display| MigrateError::Transfer {
            table: fdw_table.to_string(),
            pages,
            message: e.to_string(),
        };

        let mut client = self.pool.get().await.map_err(|e| fail(&e))?;
        let tx = client.transaction().await.map_err(|e| fail(&e))?;
        let stmt = tx
            .prepare(&copy_page_query(fdw_table))
            .await
            .map_err(|e| fail(&e))?;

        let mut copied = 0;
        for page in pages.start()..=pages.stop() {
            let page = i64::try_from(page).map_err(|e| fail(&e))?;
            copied += tx.execute(&stmt, &[&page]).await.map_err(|e| fail(&e))?;
        }
        tx.commit().await.map_err(|e| fail(&e))?;

        Ok(copied)
    }
}
