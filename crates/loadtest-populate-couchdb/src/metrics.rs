//! Response time collection and run statistics.

use std::fmt;
use std::ops::AddAssign;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What a latency sample measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// A document write, single or bulk.
    Document,
    /// An attachment upload.
    Attachment,
}

/// Response times shared by all workers.
///
/// Workers buffer their own samples and append them in one go when they
/// finish, so the locks are taken once per worker.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    documents: Mutex<Vec<Duration>>,
    attachments: Mutex<Vec<Duration>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn samples_for(&self, kind: SampleKind) -> &Mutex<Vec<Duration>> {
        match kind {
            SampleKind::Document => &self.documents,
            SampleKind::Attachment => &self.attachments,
        }
    }

    pub fn extend(&self, kind: SampleKind, samples: &[Duration]) {
        self.samples_for(kind)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(samples);
    }

    pub fn count(&self, kind: SampleKind) -> usize {
        self.samples_for(kind)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Average response time, or `None` when nothing was recorded.
    pub fn average(&self, kind: SampleKind) -> Option<Duration> {
        let samples = self
            .samples_for(kind)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if samples.is_empty() {
            return None;
        }
        let secs: Vec<f64> = samples.iter().map(Duration::as_secs_f64).collect();
        Some(Duration::from_secs_f64(online_average(&secs)))
    }
}

/// Incremental mean: `avg += (sample - avg) / (i + 1)`.
pub fn online_average(samples: &[f64]) -> f64 {
    samples
        .iter()
        .enumerate()
        .fold(0.0, |avg, (i, sample)| avg + (sample - avg) / (i + 1) as f64)
}

/// Milliseconds below 10ms, seconds otherwise.
pub fn format_response_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 0.01 {
        format!("{:.3} milliseconds", secs * 1000.0)
    } else {
        format!("{secs:.3} seconds")
    }
}

/// Counters kept by one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Accepted document writes; each revision counts.
    pub doc_writes: u64,
    pub doc_failures: u64,
    pub attachment_writes: u64,
    pub attachment_failures: u64,
    /// Forged conflicting revisions accepted by the server.
    pub conflict_writes: u64,
    pub conflict_failures: u64,
    pub reconnects: u64,
}

impl WorkerStats {
    pub fn failures(&self) -> u64 {
        self.doc_failures + self.attachment_failures + self.conflict_failures
    }
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.doc_writes += other.doc_writes;
        self.doc_failures += other.doc_failures;
        self.attachment_writes += other.attachment_writes;
        self.attachment_failures += other.attachment_failures;
        self.conflict_writes += other.conflict_writes;
        self.conflict_failures += other.conflict_failures;
        self.reconnects += other.reconnects;
    }
}

/// Outcome of populating one database.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSummary {
    pub name: String,
    pub documents: u64,
    pub stats: WorkerStats,
    pub elapsed: Duration,
}

impl DatabaseSummary {
    pub fn docs_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.documents as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for DatabaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Database '{}': {} docs, {} document writes ({} failed), {} attachments ({} failed), \
             {} conflicts ({} failed) in {:.2}s ({:.1} docs/sec)",
            self.name,
            self.documents,
            self.stats.doc_writes,
            self.stats.doc_failures,
            self.stats.attachment_writes,
            self.stats.attachment_failures,
            self.stats.conflict_writes,
            self.stats.conflict_failures,
            self.elapsed.as_secs_f64(),
            self.docs_per_second()
        )
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateSummary {
    pub databases: Vec<DatabaseSummary>,
    pub average_document_time: Option<Duration>,
    pub average_attachment_time: Option<Duration>,
}

impl PopulateSummary {
    pub fn totals(&self) -> WorkerStats {
        let mut totals = WorkerStats::default();
        for db in &self.databases {
            totals += db.stats;
        }
        totals
    }
}
