//! Reading typed rows from the old database.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::range::BlockRange;
use crate::tables::{OldRows, TableName};

const HEIGHT_BOUNDS_QUERY: &str =
    "SELECT MIN(block_number)::TEXT, MAX(block_number)::TEXT FROM eth.header_cids";

/// Source side of a migration.
#[async_trait]
pub trait BlockReader: Send + Sync {
    /// Rows of `table` within `range`, ordered by block height.
    async fn read(&self, table: TableName, range: BlockRange) -> Result<OldRows>;

    /// Lowest and highest indexed header height.
    async fn block_height_bounds(&self) -> Result<(u64, u64)>;
}

/// [`BlockReader`] over a deadpool-postgres pool.
pub struct PgReader {
    pool: Pool,
}

impl PgReader {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn height_param(table: TableName, range: BlockRange, height: u64) -> Result<i64> {
    i64::try_from(height)
        .map_err(|_| MigrateError::read(table, range, format!("height {} exceeds BIGINT", height)))
}

#[async_trait]
impl BlockReader for PgReader {
    async fn read(&self, table: TableName, range: BlockRange) -> Result<OldRows> {
        let spec = table.spec();
        let fail = |e: &dyn std::fmt::Display| MigrateError::read(table, range, e);

        let client = self.pool.get().await.map_err(|e| fail(&e))?;
        let stmt = client
            .prepare_cached(spec.read_query)
            .await
            .map_err(|e| fail(&e))?;

        let rows = if spec.height_segmented {
            let start = height_param(table, range, range.start())?;
            let stop = height_param(table, range, range.stop())?;
            client.query(&stmt, &[&start, &stop]).await
        } else {
            client.query(&stmt, &[]).await
        }
        .map_err(|e| fail(&e))?;

        debug!("{}: read {} rows for {}", table, rows.len(), range);
        OldRows::decode(table, &rows).map_err(|e| fail(&e))
    }

    async fn block_height_bounds(&self) -> Result<(u64, u64)> {
        let fail = |e: &dyn std::fmt::Display| {
            MigrateError::RangeDetection(format!("querying eth.header_cids bounds: {}", e))
        };

        let client = self.pool.get().await.map_err(|e| fail(&e))?;
        let row = client
            .query_one(HEIGHT_BOUNDS_QUERY, &[])
            .await
            .map_err(|e| fail(&e))?;
        let min: Option<String> = row.try_get(0).map_err(|e| fail(&e))?;
        let max: Option<String> = row.try_get(1).map_err(|e| fail(&e))?;
        parse_bounds(min, max)
    }
}

/// Validate the text MIN/MAX pair returned by the bounds query.
fn parse_bounds(min: Option<String>, max: Option<String>) -> Result<(u64, u64)> {
    let (min, max) = match (min, max) {
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(MigrateError::RangeDetection(
                "eth.header_cids is empty".into(),
            ))
        }
    };
    let parse = |raw: &str| {
        raw.trim().parse::<u64>().map_err(|e| {
            MigrateError::RangeDetection(format!("unparseable block number '{}': {}", raw, e))
        })
    };
    let (min, max) = (parse(&min)?, parse(&max)?);
    if min > max {
        return Err(MigrateError::RangeDetection(format!(
            "minimum height {} is above maximum height {}",
            min, max
        )));
    }
    Ok((min, max))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_parse_bounds() {
        assert_eq!(
            parse_bounds(Some("0".into()), Some("15537393".into())).unwrap(),
            (0, 15537393)
        );
    }

    #[test]
    fn test_empty_table_is_detection_error() {
        assert!(matches!(
            parse_bounds(None, None),
            Err(MigrateError::RangeDetection(_))
        ));
    }

    #[test]
    fn test_non_numeric_bound_is_detection_error() {
        assert!(matches!(
            parse_bounds(Some("1".into()), Some("-4".into())),
            Err(MigrateError::RangeDetection(_))
        ));
    }

    /// Pool that has not opened any connection yet.
    pub(crate) fn unconnected_pool() -> Pool {
        let mgr = deadpool_postgres::Manager::new(
            tokio_postgres::Config::new(),
            tokio_postgres::NoTls,
        );
        Pool::builder(mgr).max_size(1).build().unwrap()
    }

    fn closed_pool() -> Pool {
        let pool = unconnected_pool();
        pool.close();
        pool
    }

    #[tokio::test]
    async fn test_unavailable_pool_is_detection_error() {
        let reader = PgReader::new(closed_pool());
        match reader.block_height_bounds().await {
            Err(MigrateError::RangeDetection(msg)) => {
                assert!(msg.contains("eth.header_cids"), "{}", msg)
            }
            other => panic!("expected range detection error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_pool_read_is_read_error() {
        let reader = PgReader::new(closed_pool());
        let range = BlockRange::new(1, 2);
        assert!(matches!(
            reader.read(TableName::Headers, range).await,
            Err(MigrateError::Read { .. })
        ));
    }

    #[test]
    fn test_height_param_overflow() {
        let range = BlockRange::new(0, u64::MAX);
        assert!(height_param(TableName::Headers, range, u64::MAX).is_err());
        assert_eq!(height_param(TableName::Headers, range, 42).unwrap(), 42);
    }
}
