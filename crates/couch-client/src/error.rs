//! Error types for the CouchDB client.

use std::path::PathBuf;
use thiserror::Error;

/// Connection-level failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The connection was dropped by the peer.
    #[error("Connection lost: {0}")]
    Disconnected(String),

    /// A streamed attachment file could not be opened.
    #[error("Couldn't open attachment file '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Couldn't build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    /// Whether reconnecting and sending the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Http { .. } | TransportError::Disconnected(_)
        )
    }
}

/// Errors surfaced by [`crate::CouchStore`] operations.
#[derive(Error, Debug)]
pub enum CouchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-2xx status.
    #[error("{request} failed with status {status}: {reason}")]
    Request {
        request: String,
        status: u16,
        reason: String,
    },

    /// A 2xx response whose body is not what the operation expects.
    #[error("Unexpected response to {request}: {reason}")]
    UnexpectedResponse { request: String, reason: String },
}

impl CouchError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            CouchError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A revision string that is not `generation-hash`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid revision '{0}'")]
pub struct InvalidRevision(pub String);
