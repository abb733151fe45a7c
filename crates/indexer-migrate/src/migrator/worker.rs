//! One migration worker: pulls ranges until told to stop and drives each
//! through read, transform and write.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::error::MigrateError;
use crate::gap::{Gap, GapKind, GapReason};
use crate::range::BlockRange;
use crate::source::BlockReader;
use crate::tables::TableName;
use crate::target::BlockWriter;
use crate::transform::Transformer;

/// Channels a worker reports on. Send failures mean the caller stopped
/// draining and are ignored.
#[derive(Clone)]
pub(super) struct Sinks {
    pub read_gaps: UnboundedSender<Gap>,
    pub write_gaps: UnboundedSender<Gap>,
    pub errors: UnboundedSender<MigrateError>,
}

pub(super) struct Worker {
    pub id: usize,
    pub table: TableName,
    pub reader: Arc<dyn BlockReader>,
    pub writer: Arc<dyn BlockWriter>,
    pub transformer: Arc<dyn Transformer>,
    pub must_exist: bool,
    pub read_failure_gap: Option<GapKind>,
    pub ranges: async_channel::Receiver<BlockRange>,
    pub quit: CancellationToken,
    pub sinks: Sinks,
}

impl Worker {
    pub async fn run(self) {
        let span = info_span!("worker", table = %self.table, id = self.id);
        async move {
            debug!("started");
            loop {
                let range = tokio::select! {
                    biased;
                    _ = self.quit.cancelled() => {
                        debug!("stop signalled");
                        break;
                    }
                    next = self.ranges.recv() => match next {
                        Ok(range) => range,
                        Err(_) => {
                            debug!("range source closed");
                            break;
                        }
                    },
                };
                self.process(range).await;
            }
            debug!("exiting");
        }
        .instrument(span)
        .await
    }

    /// Migrate one range. Every failure is reported and the range abandoned;
    /// nothing is retried.
    async fn process(&self, range: BlockRange) {
        let rows = match self.reader.read(self.table, range).await {
            Ok(rows) => rows,
            Err(e) => {
                if let Some(kind) = self.read_failure_gap {
                    self.gap(kind, range, GapReason::ReadFailed);
                }
                self.error(e);
                return;
            }
        };

        if rows.is_empty() {
            if self.must_exist {
                self.gap(GapKind::Read, range, GapReason::EmptyRange);
                self.error(MigrateError::read(
                    self.table,
                    range,
                    "no rows found; every height must have at least one",
                ));
            } else {
                debug!("{}: no rows", range);
            }
            return;
        }
        let read = rows.len();

        let transformed = match self.transformer.transform(rows, range) {
            Ok(transformed) => transformed,
            Err(e) => {
                self.gap(GapKind::Write, range, GapReason::TransformFailed);
                self.error(e);
                return;
            }
        };

        if let Err(e) = self.writer.write(self.table, range, &transformed.rows).await {
            self.gap(GapKind::Write, range, GapReason::WriteFailed);
            self.error(e);
            return;
        }

        for missing in transformed.missing {
            self.gap(GapKind::Read, missing, GapReason::Discontinuity);
        }
        debug!(
            "{}: read {} rows, wrote {} rows",
            range,
            read,
            transformed.rows.len()
        );
    }

    fn gap(&self, kind: GapKind, range: BlockRange, reason: GapReason) {
        let gap = Gap::new(range, reason);
        warn!("{:?} gap {}", kind, gap);
        let sink = match kind {
            GapKind::Read => &self.sinks.read_gaps,
            GapKind::Write => &self.sinks.write_gaps,
        };
        let _ = sink.send(gap);
    }

    fn error(&self, e: MigrateError) {
        error!("{}", e);
        let _ = self.sinks.errors.send(e);
    }
}
