//! CouchDB document populator for load testing.
//!
//! Writes documents rendered from a template into one or more databases,
//! optionally with several revisions per document, attachments, and
//! forged conflicting revisions. Each database is populated by a pool of
//! upload workers that own disjoint ranges of document ids.
//!
//! # Example
//!
//! ```ignore
//! use couch_client::HttpConnector;
//! use loadtest_populate_couchdb::{CouchPopulateArgs, CouchPopulator, PopulateConfig};
//!
//! let config = PopulateConfig::from_args(&args)?;
//! let connector = HttpConnector::new(config.connection.clone());
//! let summary = CouchPopulator::new(config, connector).run().await?;
//! ```

pub mod args;
mod config;
mod conflicts;
mod error;
mod metrics;
mod partitioner;
mod populator;
mod revisions;
pub mod testing;
mod worker;

pub use args::{CouchConnectionArgs, CouchPopulateArgs};
pub use config::PopulateConfig;
pub use conflicts::{ConflictInjector, ConflictOutcome};
pub use error::PopulateError;
pub use metrics::{
    format_response_time, online_average, DatabaseSummary, MetricsCollector, PopulateSummary,
    SampleKind, WorkerStats,
};
pub use partitioner::{describe_partitions, partition, WorkPartition};
pub use populator::CouchPopulator;
pub use revisions::RevisionTracker;
pub use worker::{UploadWorker, WorkerReport};
