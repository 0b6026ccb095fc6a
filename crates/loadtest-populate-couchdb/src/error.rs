//! Error types for the CouchDB populator.

use couch_client::{CouchError, TransportError};
use couch_template::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a populate run.
///
/// Failures of individual writes are logged and counted instead.
#[derive(Error, Debug)]
pub enum PopulateError {
    /// Invalid option combination.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The document template is unusable.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("CouchDB error: {0}")]
    Couch(#[from] CouchError),

    /// A configuration file could not be read.
    #[error("Couldn't read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The security object file is not JSON.
    #[error("Invalid security object in '{}': {source}", path.display())]
    SecurityObject {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An upload worker panicked or was cancelled.
    #[error("Upload worker {worker} failed: {reason}")]
    Worker { worker: usize, reason: String },
}

impl From<TransportError> for PopulateError {
    fn from(e: TransportError) -> Self {
        PopulateError::Couch(CouchError::Transport(e))
    }
}
