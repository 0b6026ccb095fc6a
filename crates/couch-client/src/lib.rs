//! Minimal CouchDB client for load generation.
//!
//! Covers only what document population needs: database lifecycle, the
//! security object, single and bulk document writes, and attachment uploads.
//! Requests go through a [`Transport`]; [`HttpTransport`] is the real one.

pub mod error;
pub mod http;
pub mod request;
pub mod revision;
pub mod store;
pub mod transport;

pub use error::{CouchError, InvalidRevision, TransportError};
pub use http::{ConnectionConfig, HttpConnector, HttpTransport};
pub use request::{CouchRequest, CouchResponse, Method, RequestBody};
pub use revision::Revision;
pub use store::{BulkDocResult, CouchStore, DatabaseCreation};
pub use transport::{Connector, Transport};
