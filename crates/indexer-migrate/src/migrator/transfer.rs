//! Sequential page transfer of `public.blocks` through a foreign table.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::Done;
use crate::error::{MigrateError, Result};
use crate::range::{self, BlockRange};
use crate::target::PageCopier;

/// Handles of a running transfer.
#[derive(Debug)]
pub struct Transfer {
    /// Page ranges whose transaction failed. Nothing is retried.
    pub failed_segments: UnboundedReceiver<BlockRange>,
    pub errors: UnboundedReceiver<MigrateError>,
    pub done: Done,
    /// Number of page segments scheduled after the offset was applied.
    pub segments: usize,
}

pub(super) async fn start(
    copier: Arc<dyn PageCopier>,
    close: CancellationToken,
    fdw_table: &str,
    segment_size: u64,
    segment_offset: u64,
    max_page: u64,
) -> Result<Transfer> {
    if segment_size == 0 {
        return Err(MigrateError::Config(
            "transfer segment size must be at least 1".into(),
        ));
    }
    let max_page = match max_page {
        0 => copier.max_page(fdw_table).await?,
        page => page,
    };
    let all = range::segment(segment_size, 0, max_page)?;
    let skip = usize::try_from(segment_offset).unwrap_or(usize::MAX);
    if skip >= all.len() {
        warn!(
            "segment offset {} skips all {} segments of {}",
            segment_offset,
            all.len(),
            fdw_table
        );
    }
    let segments: Vec<BlockRange> = all.into_iter().skip(skip).collect();
    info!(
        "transferring pages 0 through {} of {} in {} segments",
        max_page,
        fdw_table,
        segments.len()
    );

    let (failed_tx, failed_segments) = mpsc::unbounded_channel();
    let (err_tx, errors) = mpsc::unbounded_channel();
    let done = CancellationToken::new();
    let count = segments.len();

    let finished = done.clone();
    let table = fdw_table.to_string();
    let span = info_span!("transfer", table = %table);
    tokio::spawn(
        async move {
            let mut copied = 0u64;
            for (i, pages) in segments.iter().enumerate() {
                if close.is_cancelled() {
                    info!("close signalled; {} segments not transferred", count - i);
                    break;
                }
                match copier.copy_pages(&table, *pages).await {
                    Ok(n) => {
                        copied += n;
                        debug!("pages {}: copied {} blocks", pages, n);
                    }
                    Err(e) => {
                        error!("pages {}: {}", pages, e);
                        let _ = failed_tx.send(*pages);
                        let _ = err_tx.send(e);
                    }
                }
            }
            info!("transfer finished: {} blocks copied", copied);
            drop(failed_tx);
            drop(err_tx);
            finished.cancel();
        }
        .instrument(span),
    );

    Ok(Transfer {
        failed_segments,
        errors,
        done: Done(done),
        segments: count,
    })
}

#[cfg(test)]
mod tests {
    use super::super::mock::{drain, MockCopier, MockReader, MockWriter};
    use super::super::{MigrationOptions, Migrator};
    use super::*;
    use crate::tables::OldRows;
    use std::time::Duration;

    fn migrator(copier: Arc<MockCopier>) -> Migrator {
        Migrator::with_io(
            Arc::new(MockReader::new(|_, _| Ok(OldRows::Uncles(Vec::new())))),
            Arc::new(MockWriter::default()),
            copier,
            MigrationOptions::default(),
        )
    }

    async fn finish(transfer: &Transfer) {
        tokio::time::timeout(Duration::from_secs(5), transfer.done.wait())
            .await
            .expect("transfer did not finish");
    }

    #[tokio::test]
    async fn test_transfer_segments_pages_in_order() {
        let copier = Arc::new(MockCopier::new(25));
        let m = migrator(copier.clone());
        let mut transfer = m.transfer("v2db_public_blocks", 10, 0, 0).await.unwrap();
        finish(&transfer).await;

        assert_eq!(transfer.segments, 3);
        assert_eq!(
            copier.copies(),
            vec![
                BlockRange::new(0, 9),
                BlockRange::new(10, 19),
                BlockRange::new(20, 25)
            ]
        );
        assert!(drain(&mut transfer.failed_segments).is_empty());
        assert!(drain(&mut transfer.errors).is_empty());
    }

    #[tokio::test]
    async fn test_failed_segment_reported_and_skipped() {
        let copier = Arc::new(MockCopier::new(25).failing_on(BlockRange::new(10, 19)));
        let m = migrator(copier.clone());
        let mut transfer = m.transfer("v2db_public_blocks", 10, 0, 0).await.unwrap();
        finish(&transfer).await;

        assert_eq!(
            drain(&mut transfer.failed_segments),
            vec![BlockRange::new(10, 19)]
        );
        assert!(matches!(
            drain(&mut transfer.errors)[..],
            [MigrateError::Transfer { .. }]
        ));
        assert_eq!(
            copier.copies(),
            vec![BlockRange::new(0, 9), BlockRange::new(20, 25)]
        );
    }

    #[tokio::test]
    async fn test_offset_and_explicit_max_page() {
        let copier = Arc::new(MockCopier::new(0));
        let m = migrator(copier.clone());
        let transfer = m.transfer("v2db_public_blocks", 10, 1, 29).await.unwrap();
        finish(&transfer).await;

        assert_eq!(
            copier.copies(),
            vec![BlockRange::new(10, 19), BlockRange::new(20, 29)]
        );
    }

    #[tokio::test]
    async fn test_setup_errors_returned_directly() {
        let m = migrator(Arc::new(MockCopier::new(0)));
        assert!(matches!(
            m.transfer("v2db_public_blocks", 10, 0, 0).await,
            Err(MigrateError::RangeDetection(_))
        ));
        assert!(matches!(
            m.transfer("v2db_public_blocks", 0, 0, 100).await,
            Err(MigrateError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_close_stops_transfer_between_segments() {
        let copier = Arc::new(MockCopier::new(99));
        let m = migrator(copier.clone());
        m.close();
        let transfer = m.transfer("v2db_public_blocks", 10, 0, 0).await.unwrap();
        finish(&transfer).await;
        assert!(copier.copies().is_empty());
    }
}
