//! Concurrent batched bulk writes.
//!
//! The record sequence is cut into fixed-size batches which a fixed pool of
//! worker threads pulls from a bounded queue. Every batch is one
//! [`BulkWriter::write_batch`] call and therefore its own transactional unit;
//! there is no transaction spanning the run. Committed rows are counted in a
//! per-run [`IngestionStats`], the only state the workers share.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::RelationshipRecord;
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};

/// Storage seam: writes all `rows` in one call and returns the number of rows
/// the store reports as affected.
pub trait BulkWriter: Send + Sync {
    fn write_batch(&self, rows: &[RelationshipRecord]) -> Result<usize, IngestError>;
}

/// Contiguous, ordered view over part of the record sequence.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedBatch<'a> {
    pub index: usize,
    pub rows: &'a [RelationshipRecord],
}

/// Per-run insertion counter and clock.
#[derive(Debug)]
pub struct IngestionStats {
    inserted: AtomicUsize,
    started: Instant,
}

impl IngestionStats {
    pub fn start() -> Self {
        Self {
            inserted: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Adds `rows` and returns the running total including them.
    pub fn record(&self, rows: usize) -> usize {
        self.inserted.fetch_add(rows, Ordering::AcqRel) + rows
    }

    pub fn inserted(&self) -> usize {
        self.inserted.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn records_per_second(&self) -> f64 {
        rate(self.inserted(), self.elapsed())
    }

    fn throughput_line(&self, inserted: usize) -> ProgressEvent {
        let elapsed = self.elapsed();
        ProgressEvent::timed(
            format!(
                "Inserted {inserted} records. Rate: {:.2} records/second",
                rate(inserted, elapsed)
            ),
            elapsed,
        )
    }
}

fn rate(records: usize, elapsed: Duration) -> f64 {
    records as f64 / elapsed.as_secs_f64().max(0.001)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOptions {
    pub batch_size: usize,
    pub workers: usize,
    pub log_interval: usize,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            workers: default_workers(),
            log_interval: 50_000,
        }
    }
}

pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistReport {
    pub total_records: usize,
    pub committed: usize,
    pub batches: usize,
    pub elapsed_ms: u128,
    pub records_per_second: f64,
}

#[derive(Debug, Clone)]
pub struct BulkPersister {
    options: PersistOptions,
}

impl BulkPersister {
    pub fn new(options: PersistOptions) -> Self {
        Self { options }
    }

    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.options.batch_size.max(1))
    }

    /// Writes `records` through `writer` and blocks until every batch has
    /// finished. A failed batch does not stop the others; the run still fails
    /// afterwards with the count of rows the successful batches committed.
    pub fn persist<W: BulkWriter + ?Sized>(
        &self,
        records: &[RelationshipRecord],
        writer: &W,
        sink: &dyn ProgressSink,
    ) -> Result<PersistReport, IngestError> {
        let batch_size = self.options.batch_size.max(1);
        let total_batches = self.batch_count(records.len());
        let stats = IngestionStats::start();
        sink.event(ProgressEvent::new(format!(
            "Total records to process: {}",
            records.len()
        )));

        if total_batches > 0 {
            let workers = self.options.workers.clamp(1, total_batches);
            let failures = Mutex::new(Vec::new());
            self.dispatch(records, batch_size, workers, writer, &stats, &failures, sink);

            let mut failures = failures
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner);
            if !failures.is_empty() {
                failures.sort_by_key(|(index, _)| *index);
                let committed = stats.inserted();
                sink.event(stats.throughput_line(committed));
                let (first_index, first_error) = &failures[0];
                return Err(IngestError::PersistenceFailure {
                    committed,
                    failed_batches: failures.len(),
                    total_batches,
                    message: format!("batch {first_index}: {first_error}"),
                });
            }
        }

        let committed = stats.inserted();
        sink.event(stats.throughput_line(committed));
        Ok(PersistReport {
            total_records: records.len(),
            committed,
            batches: total_batches,
            elapsed_ms: stats.elapsed().as_millis(),
            records_per_second: stats.records_per_second(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch<W: BulkWriter + ?Sized>(
        &self,
        records: &[RelationshipRecord],
        batch_size: usize,
        workers: usize,
        writer: &W,
        stats: &IngestionStats,
        failures: &Mutex<Vec<(usize, IngestError)>>,
        sink: &dyn ProgressSink,
    ) {
        let log_interval = self.options.log_interval;
        let (sender, receiver) = crossbeam_channel::bounded::<NormalizedBatch<'_>>(workers);

        thread::scope(|scope| {
            for _ in 0..workers {
                let receiver = receiver.clone();
                scope.spawn(move || {
                    for batch in receiver.iter() {
                        write_one(batch, writer, stats, failures, sink, log_interval);
                    }
                });
            }
            drop(receiver);

            for (index, rows) in records.chunks(batch_size).enumerate() {
                if sender.send(NormalizedBatch { index, rows }).is_err() {
                    tracing::error!("all persistence workers exited before batch {index}");
                    break;
                }
            }
            drop(sender);
        });
    }
}

fn write_one<W: BulkWriter + ?Sized>(
    batch: NormalizedBatch<'_>,
    writer: &W,
    stats: &IngestionStats,
    failures: &Mutex<Vec<(usize, IngestError)>>,
    sink: &dyn ProgressSink,
    log_interval: usize,
) {
    match writer.write_batch(batch.rows) {
        Ok(written) => {
            if written != batch.rows.len() {
                tracing::warn!(
                    batch = batch.index,
                    rows = batch.rows.len(),
                    written,
                    "store reported a different affected-row count than rows sent"
                );
            }
            let total = stats.record(written);
            if log_interval > 0 && (total - written) / log_interval != total / log_interval {
                sink.event(stats.throughput_line(total));
            }
        }
        Err(err) => {
            tracing::error!(batch = batch.index, rows = batch.rows.len(), "batch write failed: {err}");
            failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((batch.index, err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_returns_running_total() {
        let stats = IngestionStats::start();
        assert_eq!(stats.record(10), 10);
        assert_eq!(stats.record(5), 15);
        assert_eq!(stats.inserted(), 15);
    }

    #[test]
    fn batch_count_rounds_up() {
        let persister = BulkPersister::new(PersistOptions {
            batch_size: 4,
            workers: 2,
            log_interval: 100,
        });
        assert_eq!(persister.batch_count(0), 0);
        assert_eq!(persister.batch_count(4), 1);
        assert_eq!(persister.batch_count(9), 3);
    }

    #[test]
    fn default_workers_is_positive() {
        assert!(default_workers() >= 2);
    }
}
