//! Conflicting revision injection for the bulk path.

use crate::revisions::RevisionTracker;
use couch_client::{CouchStore, Transport};
use couch_template::Document;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Counters and timings of one injection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictOutcome {
    pub written: u64,
    pub failed: u64,
    /// One sample per `_bulk_docs` request.
    pub response_times: Vec<Duration>,
}

/// Forges sibling revisions and writes them with `new_edits: false`.
pub struct ConflictInjector<'a> {
    db: &'a str,
    passes: u32,
}

impl<'a> ConflictInjector<'a> {
    pub fn new(db: &'a str, passes: u32) -> Self {
        Self { db, passes }
    }

    /// Bulk bodies for one conflict pass: every document with a known
    /// revision, carrying a fresh revision at the same generation.
    pub fn forge(docs: &[Document], tracker: &RevisionTracker) -> Vec<serde_json::Value> {
        docs.iter()
            .filter_map(|doc| {
                let rev = tracker.get(&doc.id)?;
                let mut forged = doc.clone();
                forged.rev = Some(rev.conflicting_sibling().to_string());
                Some(forged.to_bulk_body())
            })
            .collect()
    }

    /// Run every conflict pass over `docs`. The tracker is only read.
    pub async fn inject<T: Transport>(
        &self,
        store: &mut CouchStore<T>,
        docs: &[Document],
        tracker: &RevisionTracker,
    ) -> ConflictOutcome {
        let mut outcome = ConflictOutcome::default();
        for pass in 1..=self.passes {
            let bodies = Self::forge(docs, tracker);
            if bodies.is_empty() {
                return outcome;
            }
            let submitted = bodies.len() as u64;

            let started = Instant::now();
            let result = store.bulk_docs(self.db, bodies, false).await;
            outcome.response_times.push(started.elapsed());

            match result {
                Ok(results) => {
                    let mut failed = 0;
                    for result in &results {
                        if let Some(reason) = result.failure() {
                            failed += 1;
                            error!(
                                "Error uploading conflict for document {} in '{}' (conflict number {pass}): {reason}",
                                result.id.as_deref().unwrap_or("?"),
                                self.db
                            );
                        }
                    }
                    outcome.failed += failed;
                    outcome.written += submitted.saturating_sub(failed);
                    info!(
                        "Uploaded {submitted} conflict documents via _bulk_docs to '{}' (conflict number {pass})",
                        self.db
                    );
                }
                Err(e) => {
                    outcome.failed += submitted;
                    error!(
                        "Error uploading {submitted} conflict documents to '{}' (conflict number {pass}): {e}",
                        self.db
                    );
                }
            }
        }
        outcome
    }
}
