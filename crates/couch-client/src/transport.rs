//! Transport abstraction.
//!
//! [`crate::CouchStore`] talks to the server through a [`Transport`], so the
//! upload logic can run against HTTP or an in-memory server alike.

use crate::error::TransportError;
use crate::request::{CouchRequest, CouchResponse};

/// One persistent connection to the server.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send a request and wait for its response.
    ///
    /// Non-2xx responses are returned as `Ok`; only connection-level
    /// failures are errors.
    async fn send(&mut self, request: &CouchRequest) -> Result<CouchResponse, TransportError>;

    /// Drop the current connection and establish a new one.
    async fn reconnect(&mut self) -> Result<(), TransportError>;
}

/// Opens new connections; each worker owns the one it gets.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport + 'static;

    fn connect(&self) -> Result<Self::Transport, TransportError>;
}
