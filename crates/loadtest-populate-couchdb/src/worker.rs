//! Upload workers.
//!
//! Each worker owns one connection and one id partition. With a batch size
//! of 1 every document is written on its own, revision after revision, and
//! its attachments are uploaded after the last one. Larger batches go
//! through `_bulk_docs` in revision passes, optionally followed by conflict
//! injection.

use crate::config::PopulateConfig;
use crate::conflicts::ConflictInjector;
use crate::metrics::{format_response_time, MetricsCollector, SampleKind, WorkerStats};
use crate::partitioner::WorkPartition;
use crate::revisions::RevisionTracker;
use couch_client::{CouchError, CouchStore, RequestBody, Revision, Transport, TransportError};
use couch_template::{AttachmentPayload, Document};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// What a worker leaves behind.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub partition: WorkPartition,
    pub stats: WorkerStats,
    pub revisions: RevisionTracker,
}

pub struct UploadWorker<T: Transport> {
    worker_id: usize,
    db: String,
    partition: WorkPartition,
    config: Arc<PopulateConfig>,
    metrics: Arc<MetricsCollector>,
    store: CouchStore<T>,
    tracker: RevisionTracker,
    stats: WorkerStats,
    doc_times: Vec<Duration>,
    attachment_times: Vec<Duration>,
}

impl<T: Transport> UploadWorker<T> {
    pub fn new(
        worker_id: usize,
        db: impl Into<String>,
        partition: WorkPartition,
        config: Arc<PopulateConfig>,
        metrics: Arc<MetricsCollector>,
        store: CouchStore<T>,
    ) -> Self {
        Self {
            worker_id,
            db: db.into(),
            partition,
            config,
            metrics,
            store,
            tracker: RevisionTracker::new(),
            stats: WorkerStats::default(),
            doc_times: Vec::new(),
            attachment_times: Vec::new(),
        }
    }

    /// Write every document of the partition.
    pub async fn run(mut self) -> WorkerReport {
        debug!(
            "Worker {} assigned docs {}..{} of '{}'",
            self.worker_id, self.partition.start, self.partition.end, self.db
        );

        if self.config.uses_bulk() {
            self.run_bulk().await;
        } else {
            self.run_per_revision().await;
        }

        self.metrics.extend(SampleKind::Document, &self.doc_times);
        self.metrics
            .extend(SampleKind::Attachment, &self.attachment_times);
        self.stats.reconnects = self.store.reconnects();

        WorkerReport {
            worker_id: self.worker_id,
            partition: self.partition,
            stats: self.stats,
            revisions: self.tracker,
        }
    }

    fn render(&self, id_counter: u64) -> Option<Document> {
        let ctx = self.config.context(id_counter);
        match self.config.template.render(&ctx, self.config.attachment_mode()) {
            Ok(doc) => Some(doc),
            Err(e) => {
                error!(
                    "Couldn't generate document #{id_counter} for '{}': {e}",
                    self.db
                );
                None
            }
        }
    }

    fn log_write(&self, what: &str, elapsed: Duration) {
        if self.config.times {
            info!("{what}  (response time: {})", format_response_time(elapsed));
        } else {
            info!("{what}");
        }
    }

    async fn run_per_revision(&mut self) {
        for id_counter in self.partition.ids() {
            match self.render(id_counter) {
                Some(doc) => self.put_revisions(doc).await,
                None => self.stats.doc_failures += 1,
            }
        }
    }

    /// Write `revs_per_doc` revisions of one document, each chained to the
    /// previous response, then upload its attachments.
    async fn put_revisions(&mut self, mut doc: Document) {
        let db = self.db.clone();
        let mut current: Option<Revision> = None;
        doc.rev = None;

        for pass in 1..=self.config.revs_per_doc {
            let started = Instant::now();
            let result = self
                .store
                .put_document(&db, &doc.id, current.as_ref(), doc.to_body())
                .await;
            let elapsed = started.elapsed();

            match result {
                Ok(rev) => {
                    self.doc_times.push(elapsed);
                    self.stats.doc_writes += 1;
                    self.log_write(
                        &format!("Created doc at /{db}/{} (revision {rev})", doc.id),
                        elapsed,
                    );
                    doc.rev = Some(rev.to_string());
                    current = Some(rev);
                }
                Err(e) => {
                    self.stats.doc_failures += 1;
                    error!(
                        "Error creating doc at /{db}/{} (revision number {pass}): {e}",
                        doc.id
                    );
                    return;
                }
            }
        }

        if let Some(rev) = current {
            self.upload_attachments(&doc, rev).await;
        }
    }

    /// Upload attachments one after the other; each new revision is used for
    /// the next upload.
    async fn upload_attachments(&mut self, doc: &Document, mut rev: Revision) {
        let db = self.db.clone();
        for attachment in &doc.attachments {
            let body = match &attachment.payload {
                AttachmentPayload::InlineBytes(bytes) => RequestBody::Bytes(bytes.clone()),
                AttachmentPayload::FileReference(path) => RequestBody::File(path.clone()),
            };
            let path = format!("/{db}/{}/{}", doc.id, attachment.name);

            let started = Instant::now();
            let result = self
                .store
                .put_attachment(
                    &db,
                    &doc.id,
                    &attachment.name,
                    &rev,
                    attachment.content_type.as_deref(),
                    body,
                )
                .await;
            let elapsed = started.elapsed();

            match result {
                Ok(new_rev) => {
                    self.attachment_times.push(elapsed);
                    self.stats.attachment_writes += 1;
                    self.log_write(&format!("Uploaded attachment {path}"), elapsed);
                    debug!("Doc at /{db}/{} has now revision {new_rev}", doc.id);
                    rev = new_rev;
                }
                Err(CouchError::Transport(TransportError::File { path: file, source })) => {
                    self.stats.attachment_failures += 1;
                    error!(
                        "Couldn't open attachment file {} for {path}: {source}",
                        file.display()
                    );
                }
                Err(e) => {
                    self.stats.attachment_failures += 1;
                    error!("Error uploading attachment at {path}: {e}");
                }
            }
        }
    }

    async fn run_bulk(&mut self) {
        let batch_size = self.config.bulk_batch;
        let revs = self.config.revs_per_doc;
        let last_id = self.partition.end;

        for pass in 1..=revs {
            let mut batch: Vec<Document> = Vec::with_capacity(batch_size);
            for id_counter in self.partition.ids() {
                match self.render(id_counter) {
                    Some(mut doc) => {
                        doc.rev = self.tracker.get(&doc.id).map(ToString::to_string);
                        batch.push(doc);
                    }
                    None => self.stats.doc_failures += 1,
                }

                if !batch.is_empty() && (batch.len() >= batch_size || id_counter == last_id) {
                    let docs = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    self.flush(&docs, pass).await;
                    if pass == revs && self.config.conflicts_per_doc > 0 {
                        self.inject_conflicts(&docs).await;
                    }
                }
            }
        }
    }

    /// Submit one batch and record the new revisions.
    async fn flush(&mut self, docs: &[Document], pass: u32) {
        let db = self.db.clone();
        let bodies = docs.iter().map(Document::to_bulk_body).collect();

        let started = Instant::now();
        let result = self.store.bulk_docs(&db, bodies, true).await;
        let elapsed = started.elapsed();
        self.doc_times.push(elapsed);

        let results = match result {
            Ok(results) => results,
            Err(e) => {
                self.stats.doc_failures += docs.len() as u64;
                error!(
                    "Error uploading {} documents via _bulk_docs to '{db}' (revision number {pass}): {e}",
                    docs.len()
                );
                return;
            }
        };

        for (doc, result) in docs.iter().zip(&results) {
            match result.revision() {
                Some(rev) => {
                    self.stats.doc_writes += 1;
                    self.tracker.record(doc.id.clone(), rev);
                }
                None => {
                    self.stats.doc_failures += 1;
                    error!(
                        "Error uploading document {} via _bulk_docs to '{db}' (revision number {pass}): {}",
                        doc.id,
                        result.failure().unwrap_or_else(|| "no revision returned".to_string())
                    );
                }
            }
        }
        if results.len() < docs.len() {
            let missing = docs.len() - results.len();
            self.stats.doc_failures += missing as u64;
            error!("_bulk_docs on '{db}' returned {missing} fewer results than documents sent");
        }

        self.log_write(
            &format!("Uploaded {} documents via _bulk_docs to '{db}'", docs.len()),
            elapsed,
        );
    }

    async fn inject_conflicts(&mut self, docs: &[Document]) {
        let outcome = ConflictInjector::new(&self.db, self.config.conflicts_per_doc)
            .inject(&mut self.store, docs, &self.tracker)
            .await;
        self.stats.conflict_writes += outcome.written;
        self.stats.conflict_failures += outcome.failed;
        self.doc_times.extend(outcome.response_times);
    }
}
