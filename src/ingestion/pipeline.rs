//! Pipeline Driver - reads, transforms, batches and writes one CSV stream
//!
//! Lines are handled strictly in file order. Full batches are handed to a
//! single writer task over a bounded channel, so reading can continue while a
//! write is in flight, batches still reach the store in order, and a slow
//! store pushes back on the reader once the channel is full.

use crate::config::{MalformedRows, PipelineOptions};
use crate::db::store::RecordStore;
use crate::error::{IngestError, Result};
use crate::ingestion::batch::{Batch, BatchAccumulator, BatchWriter};
use crate::ingestion::header::Header;
use crate::ingestion::line_source::LineSource;
use crate::ingestion::record::assemble;
use crate::ingestion::transform::transform;
use crate::ingestion::{BatchFailure, IngestionReport, IngestionStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    HeaderPending,
    Streaming,
    Flushing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, HeaderPending)
                | (HeaderPending, Streaming)
                // Empty input: no header, nothing to stream
                | (HeaderPending, Flushing)
                | (HeaderPending, Failed)
                | (Streaming, Flushing)
                | (Streaming, Failed)
                | (Flushing, Done)
                | (Flushing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// What the writer task reports back once the channel closes
#[derive(Debug, Default)]
struct WriteSummary {
    batches_written: u64,
    rows_written: u64,
    failures: Vec<BatchFailure>,
}

/// Drives one ingestion run. Create a new driver per run.
pub struct PipelineDriver {
    options: PipelineOptions,
    writer: BatchWriter,
    state: PipelineState,
    report: IngestionReport,
}

impl PipelineDriver {
    pub fn new(store: Arc<dyn RecordStore>, options: PipelineOptions) -> Self {
        Self {
            options,
            writer: BatchWriter::new(store),
            state: PipelineState::Idle,
            report: IngestionReport::new(Uuid::new_v4()),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.report.run_id
    }

    /// Counters so far; complete once `run` has returned
    pub fn report(&self) -> &IngestionReport {
        &self.report
    }

    /// Open `path` and run the whole pipeline over it.
    /// A missing file fails before anything is read or written.
    pub async fn run_file(&mut self, path: &Path) -> Result<IngestionReport> {
        self.ensure_unused()?;
        let source = match LineSource::open(path).await {
            Ok(source) => source,
            Err(e) => {
                error!(run_id = %self.report.run_id, "Cannot open {}: {}", path.display(), e);
                self.state = PipelineState::Failed;
                self.finish(IngestionStatus::Failed, Some(e.to_string()));
                return Err(e);
            }
        };
        info!(run_id = %self.report.run_id, "Ingesting {}", path.display());
        self.run(source).await
    }

    pub async fn run<R>(&mut self, mut source: LineSource<R>) -> Result<IngestionReport>
    where
        R: AsyncBufRead + Unpin,
    {
        self.ensure_unused()?;
        let run_id = self.report.run_id;
        self.transition(PipelineState::HeaderPending);

        let (tx, rx) = mpsc::channel::<Batch>(self.options.write_queue_depth.max(1));
        let writer_task = tokio::spawn(
            write_batches(self.writer.clone(), rx).instrument(info_span!("batch_writer", %run_id)),
        );

        let streamed = self.stream(&mut source, &tx).await;
        self.report.lines_read = source.lines_read();
        drop(tx);

        // Whatever was submitted gets written, even if reading failed
        let summary = match writer_task.await {
            Ok(summary) => summary,
            Err(e) => {
                let err = IngestError::Store(format!("batch writer task stopped: {}", e));
                return Err(self.fail(err));
            }
        };
        self.report.batches_written = summary.batches_written;
        self.report.rows_written = summary.rows_written;
        self.report.failed_batches = summary.failures;

        if let Err(e) = streamed {
            return Err(self.fail(e));
        }

        self.transition(PipelineState::Done);
        let status = if self.report.failed_batches.is_empty() {
            IngestionStatus::Success
        } else {
            IngestionStatus::Partial
        };
        self.finish(status, None);

        info!(
            run_id = %run_id,
            records = self.report.records_produced,
            batches = self.report.batches_submitted,
            failed_batches = self.report.failed_batches.len(),
            "Ingestion finished"
        );
        Ok(self.report.clone())
    }

    async fn stream<R>(&mut self, source: &mut LineSource<R>, tx: &mpsc::Sender<Batch>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let Some(header_line) = source.next_line().await? else {
            warn!(run_id = %self.report.run_id, "Input is empty, nothing to ingest");
            self.transition(PipelineState::Flushing);
            return Ok(());
        };
        let header = Header::parse(&header_line)?;
        debug!(columns = header.len(), "Parsed header");
        self.transition(PipelineState::Streaming);

        let mut accumulator = BatchAccumulator::new(self.options.batch_size);

        while let Some(line) = source.next_line().await? {
            if line.text.trim().is_empty() {
                self.report.blank_lines += 1;
                continue;
            }
            self.report.data_lines += 1;

            let assembled = match assemble(&header, &line) {
                Ok(assembled) => assembled,
                Err(e @ IngestError::MalformedRecord { .. }) if self.options.malformed_rows == MalformedRows::Skip => {
                    warn!(line = line.number, "Skipping line: {}", e);
                    self.report.skipped_lines += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.report.age_parse_warnings += u64::from(assembled.age_parse_warnings);

            let record = transform(&assembled.record);
            self.report.records_produced += 1;

            if accumulator.add(record) {
                self.submit(tx, accumulator.drain()).await?;
            }
        }

        self.transition(PipelineState::Flushing);
        let remainder = accumulator.drain();
        if !remainder.is_empty() {
            self.submit(tx, remainder).await?;
        }
        Ok(())
    }

    async fn submit(&mut self, tx: &mpsc::Sender<Batch>, batch: Batch) -> Result<()> {
        debug!(sequence = batch.sequence, rows = batch.len(), "Submitting batch");
        tx.send(batch)
            .await
            .map_err(|_| IngestError::Store("batch writer task is no longer running".to_string()))?;
        self.report.batches_submitted += 1;
        Ok(())
    }

    /// A finished driver keeps its report; it never starts a second run
    fn ensure_unused(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(IngestError::Config(format!(
                "run {} already finished ({:?}); create a new driver",
                self.report.run_id, self.state
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Pipeline state");
        self.state = next;
    }

    fn fail(&mut self, err: IngestError) -> IngestError {
        error!(run_id = %self.report.run_id, "Ingestion failed: {}", err);
        self.state = PipelineState::Failed;
        self.finish(IngestionStatus::Failed, Some(err.to_string()));
        err
    }

    fn finish(&mut self, status: IngestionStatus, error: Option<String>) {
        self.report.status = status;
        self.report.error = error;
        self.report.finished_at = Some(Utc::now());
    }
}

async fn write_batches(writer: BatchWriter, mut rx: mpsc::Receiver<Batch>) -> WriteSummary {
    let mut summary = WriteSummary::default();

    while let Some(batch) = rx.recv().await {
        match writer.write(&batch).await {
            Ok(rows) => {
                summary.batches_written += 1;
                summary.rows_written += rows;
                info!(sequence = batch.sequence, rows, "Batch written");
            }
            Err(e) => {
                // Absorbed: the next batch is still attempted
                error!(sequence = batch.sequence, rows = batch.len(), "{}", e);
                summary.failures.push(BatchFailure {
                    sequence: batch.sequence,
                    rows: batch.len(),
                    message: e.to_string(),
                });
            }
        }
    }

    summary
}

/// Run one ingestion over the file at `path`
pub async fn ingest_file(
    path: &Path,
    store: Arc<dyn RecordStore>,
    options: PipelineOptions,
) -> Result<IngestionReport> {
    PipelineDriver::new(store, options).run_file(path).await
}
