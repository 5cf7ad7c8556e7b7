use std::time::Instant;

use serde::Serialize;

use crate::alert::Alerter;
use crate::decompress::decompress_detailed;
use crate::domain::{Codec, RelationshipRecord, SnapshotDate};
use crate::error::IngestError;
use crate::feed::{FeedTransport, FetchOutcome, Fetcher, Pagination};
use crate::normalize::{NormalizeOptions, normalize_with};
use crate::persist::{BulkPersister, BulkWriter, PersistReport};
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub snapshot_date: Option<SnapshotDate>,
    pub paginate: bool,
    pub pagination: Pagination,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub pages: u32,
    pub records_fetched: usize,
    pub committed: usize,
    pub batches: usize,
    pub elapsed_ms: u128,
    pub records_per_second: f64,
    pub dry_run: bool,
    pub finished_at: String,
}

impl IngestReport {
    fn new(source: &str, pages: u32, fetched: usize, persisted: Option<PersistReport>) -> Self {
        let dry_run = persisted.is_none();
        let persisted = persisted.unwrap_or(PersistReport {
            total_records: fetched,
            committed: 0,
            batches: 0,
            elapsed_ms: 0,
            records_per_second: 0.0,
        });
        Self {
            source: source.to_string(),
            pages,
            records_fetched: fetched,
            committed: persisted.committed,
            batches: persisted.batches,
            elapsed_ms: persisted.elapsed_ms,
            records_per_second: persisted.records_per_second,
            dry_run,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub codec: Codec,
    pub records: usize,
    pub with_reason: usize,
    pub sample: Vec<RelationshipRecord>,
}

pub struct App<T: FeedTransport, A: Alerter> {
    fetcher: Fetcher<T, A>,
    persister: BulkPersister,
}

impl<T: FeedTransport, A: Alerter> App<T, A> {
    pub fn new(fetcher: Fetcher<T, A>, persister: BulkPersister) -> Self {
        Self { fetcher, persister }
    }

    pub fn fetch(&self, options: &RunOptions) -> Result<FetchOutcome, IngestError> {
        if options.paginate {
            self.fetcher
                .fetch_all(options.snapshot_date, options.pagination)
        } else {
            self.fetcher.fetch_single(options.snapshot_date)
        }
    }

    /// Fetches the feed and bulk-loads it through `writer`.
    pub fn run<W: BulkWriter + ?Sized>(
        &self,
        options: RunOptions,
        writer: &W,
        sink: &dyn ProgressSink,
    ) -> Result<IngestReport, IngestError> {
        sink.event(ProgressEvent::new("phase=Fetch; requesting feed"));
        let start = Instant::now();
        let outcome = self.fetch(&options)?;
        sink.event(ProgressEvent::timed(
            format!(
                "phase=Fetch; {} records from {} page(s)",
                outcome.records.len(),
                outcome.pages
            ),
            start.elapsed(),
        ));

        if options.dry_run {
            return Ok(IngestReport::new(
                "feed",
                outcome.pages,
                outcome.records.len(),
                None,
            ));
        }

        sink.event(ProgressEvent::new("phase=Store; writing batches"));
        let persisted = self.persister.persist(&outcome.records, writer, sink)?;
        Ok(IngestReport::new(
            "feed",
            outcome.pages,
            outcome.records.len(),
            Some(persisted),
        ))
    }
}

/// Loads a payload captured earlier (compressed or not) instead of calling
/// the feed.
pub fn load_payload<W: BulkWriter + ?Sized>(
    bytes: &[u8],
    normalize: NormalizeOptions,
    persister: &BulkPersister,
    writer: &W,
    sink: &dyn ProgressSink,
) -> Result<IngestReport, IngestError> {
    let decoded = decompress_detailed(bytes);
    sink.event(ProgressEvent::new(format!(
        "phase=Decode; {} payload, {} bytes",
        decoded.codec,
        bytes.len()
    )));
    let records = normalize_with(&decoded.text, normalize)?;
    let persisted = persister.persist(&records, writer, sink)?;
    Ok(IngestReport::new("file", 0, records.len(), Some(persisted)))
}

pub fn inspect(
    bytes: &[u8],
    normalize: NormalizeOptions,
    sample: usize,
) -> Result<InspectResult, IngestError> {
    let decoded = decompress_detailed(bytes);
    let records = normalize_with(&decoded.text, normalize)?;
    Ok(InspectResult {
        codec: decoded.codec,
        records: records.len(),
        with_reason: records
            .iter()
            .filter(|record| record.golden_bdr_id.is_some() || record.label.is_some())
            .count(),
        sample: records.into_iter().take(sample).collect(),
    })
}
