//! Per-target run orchestration.
//!
//! ```text
//! ListingFetch → ListingExtract → per record {Fetch → Extract → Diff → (Write → Sync)} → Done
//! ```
//!
//! A run never fails as a whole. Record-level failures are logged with their
//! error kind, counted in the [`RunReport`] and skipped; the run always
//! reaches [`PipelineState::Done`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{Result, StandfastError};
use crate::detector::{Change, ChangeDetector};
use crate::domain::{Record, TargetSpec};
use crate::extractor::{Extractor, ListingEntry, ListingExtractor};
use crate::fetcher::Fetcher;
use crate::remote::RemoteSync;
use crate::store::FingerprintStore;
use crate::writer::LocalWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    ListingFetch,
    ListingExtract,
    Records,
    Rollup,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::ListingFetch => "listing-fetch",
            PipelineState::ListingExtract => "listing-extract",
            PipelineState::Records => "records",
            PipelineState::Rollup => "rollup",
            PipelineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one target run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub target: String,
    pub state: PipelineState,
    /// Child URLs found on the listing.
    pub listed: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    /// Artifacts written, rollups included.
    pub written: usize,
    /// Artifacts mirrored to the remote, rollups included.
    pub synced: usize,
    /// Records skipped because no identity could be read from their URL.
    pub skipped: usize,
    /// Listing entries whose identity was already handled this run.
    pub duplicates: usize,
    pub failed: usize,
    /// Every failure by error kind, listing and rollup failures included.
    pub failures: BTreeMap<String, usize>,
}

impl RunReport {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            state: PipelineState::ListingFetch,
            listed: 0,
            new: 0,
            changed: 0,
            unchanged: 0,
            written: 0,
            synced: 0,
            skipped: 0,
            duplicates: 0,
            failed: 0,
            failures: BTreeMap::new(),
        }
    }

    fn enter(&mut self, state: PipelineState) {
        debug!("{}: {} → {}", self.target, self.state, state);
        self.state = state;
    }

    fn note_failure(&mut self, error: &StandfastError) {
        *self.failures.entry(error.kind().to_string()).or_default() += 1;
    }

    /// Report for a target that could not be started at all.
    pub fn aborted(target: &str, error: &StandfastError) -> Self {
        let mut report = Self::new(target);
        report.note_failure(error);
        report.failed = 1;
        report.state = PipelineState::Done;
        report
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} listed, {} new, {} changed, {} unchanged, {} written, {} synced, {} skipped, {} duplicate, {} failed",
            self.target,
            self.listed,
            self.new,
            self.changed,
            self.unchanged,
            self.written,
            self.synced,
            self.skipped,
            self.duplicates,
            self.failed
        )
    }
}

/// Everything one target run needs, borrowed from the caller.
pub struct Pipeline<'a, S> {
    target: &'a TargetSpec,
    fetcher: &'a (dyn Fetcher + Send + Sync),
    writer: &'a LocalWriter,
    remote: Option<&'a RemoteSync>,
    detector: ChangeDetector<S>,
}

impl<'a, S: FingerprintStore + Send + Sync> Pipeline<'a, S> {
    pub fn new(
        target: &'a TargetSpec,
        fetcher: &'a (dyn Fetcher + Send + Sync),
        writer: &'a LocalWriter,
        remote: Option<&'a RemoteSync>,
        store: S,
    ) -> Self {
        Self {
            target,
            fetcher,
            writer,
            remote,
            detector: ChangeDetector::new(store),
        }
    }

    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new(&self.target.name);
        info!("Running target {}", self.target.name);

        match self.collect(&mut report).await {
            Ok(Some((extractor, entries))) => {
                report.enter(PipelineState::Records);
                let mut seen = HashSet::new();
                for entry in entries {
                    self.run_record(&extractor, entry, &mut seen, &mut report)
                        .await;
                }
                if self.target.rollup {
                    report.enter(PipelineState::Rollup);
                    if let Err(e) = self.rollup(&mut report).await {
                        warn!("[{}] rollup for {} failed: {}", e.kind(), self.target.name, e);
                        report.note_failure(&e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "[{}] {} stopped at {}: {}",
                    e.kind(),
                    self.target.name,
                    report.state,
                    e
                );
                report.note_failure(&e);
            }
        }

        report.enter(PipelineState::Done);
        info!("{}", report);
        report
    }

    /// Fetch the listing and return its entries. `None` means the listing
    /// was empty.
    async fn collect(
        &self,
        report: &mut RunReport,
    ) -> Result<Option<(Extractor, Vec<ListingEntry>)>> {
        // compile every rule before touching the network
        let listing = ListingExtractor::new(&self.target.listing)?;
        let extractor = Extractor::new(&self.target.detail)?;

        let (url, mode) = listing.request();
        let body = self.fetcher.fetch(url, &mode).await?;

        report.enter(PipelineState::ListingExtract);
        let entries = match listing.extract(&body) {
            Ok(entries) => entries,
            Err(StandfastError::Extraction(reason)) => {
                warn!("Listing {} is empty: {}", url, reason);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        report.listed = entries.len();
        info!("{}: {} records listed", self.target.name, entries.len());
        Ok((!entries.is_empty()).then_some((extractor, entries)))
    }

    async fn run_record(
        &self,
        extractor: &Extractor,
        entry: ListingEntry,
        seen: &mut HashSet<String>,
        report: &mut RunReport,
    ) {
        let identity = match self.target.identity.parse(&entry.url) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("[{}] skipping {}: {}", e.kind(), entry.url, e);
                report.note_failure(&e);
                report.skipped += 1;
                return;
            }
        };

        // one record per identity, the first link wins
        if !seen.insert(identity.clone()) {
            warn!("{} repeats identity {}, skipping", entry.url, identity);
            report.duplicates += 1;
            return;
        }

        let url = entry.url.clone();
        match self.process(extractor, identity, entry, report).await {
            Ok(Change::New) => report.new += 1,
            Ok(Change::Changed) => report.changed += 1,
            Ok(Change::Unchanged) => report.unchanged += 1,
            Err(e) => {
                warn!("[{}] {} failed: {}", e.kind(), url, e);
                report.note_failure(&e);
                report.failed += 1;
            }
        }
    }

    /// Fetch → Extract → Diff → Write → Sync → commit for one child URL.
    /// The fingerprint is committed only once every downstream step
    /// succeeded, so a failed sync is retried on the next run.
    async fn process(
        &self,
        extractor: &Extractor,
        identity: String,
        entry: ListingEntry,
        report: &mut RunReport,
    ) -> Result<Change> {
        let html = self.fetcher.fetch(&entry.url, &self.target.detail.mode).await?;

        // listing fields first, then whatever the child page says
        let mut fields = entry.fields;
        fields.extend(extractor.extract(&html)?);
        let record = Record::new(identity, entry.url, fields)?;

        let change = self.detector.classify(&record)?;
        if change == Change::Unchanged {
            debug!("{} unchanged", record.identity);
            return Ok(change);
        }

        let path = self.writer.write_record(self.target, &record)?;
        report.written += 1;

        // a sync failure returns before the commit below
        if let Some(remote) = self.remote {
            remote
                .sync_file(&path, self.target.format.mime_type())
                .await?;
            report.synced += 1;
        }

        self.detector.commit(&record)?;
        info!("{} {} → {}", change, record.identity, path.display());
        Ok(change)
    }

    async fn rollup(&self, report: &mut RunReport) -> Result<()> {
        let complete = self
            .writer
            .rollup_paths(self.target)
            .iter()
            .all(|path| path.exists());
        if report.written == 0 && complete {
            debug!("{}: rollup up to date", self.target.name);
            return Ok(());
        }

        for path in self.writer.write_rollup(self.target)? {
            report.written += 1;
            if let Some(remote) = self.remote {
                let mime = if path.extension().is_some_and(|e| e == "csv") {
                    "text/csv"
                } else {
                    "application/json"
                };
                remote.sync_file(&path, mime).await?;
                report.synced += 1;
            }
        }
        Ok(())
    }
}
