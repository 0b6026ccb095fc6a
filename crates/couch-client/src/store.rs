//! CouchDB operations over a [`Transport`].

use crate::error::{CouchError, TransportError};
use crate::request::{CouchRequest, CouchResponse, Method, RequestBody};
use crate::revision::Revision;
use crate::transport::Transport;
use serde::Deserialize;
use serde_json::{json, Value};

/// Outcome of creating a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseCreation {
    Created,
    AlreadyExists,
}

/// One entry of a `_bulk_docs` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkDocResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkDocResult {
    /// The new revision, when the write succeeded.
    pub fn revision(&self) -> Option<Revision> {
        if self.error.is_some() {
            return None;
        }
        self.rev.as_deref().and_then(|rev| rev.parse().ok())
    }

    /// Human-readable failure, when the write failed.
    pub fn failure(&self) -> Option<String> {
        let error = self.error.as_deref()?;
        Some(match &self.reason {
            Some(reason) => format!("{error}: {reason}"),
            None => error.to_string(),
        })
    }
}

/// Typed CouchDB operations on one connection.
///
/// A request that fails at the connection level is retried exactly once
/// after reconnecting.
pub struct CouchStore<T: Transport> {
    transport: T,
    reconnects: u64,
}

impl<T: Transport> CouchStore<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            reconnects: 0,
        }
    }

    /// Number of reconnects performed so far.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send(&mut self, request: &CouchRequest) -> Result<CouchResponse, TransportError> {
        match self.transport.send(request).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!("{} failed ({e}); reconnecting", request.describe());
                self.transport.reconnect().await?;
                self.reconnects += 1;
                self.transport.send(request).await
            }
            result => result,
        }
    }

    /// Send a request and require a 2xx response.
    pub async fn execute(&mut self, request: &CouchRequest) -> Result<CouchResponse, CouchError> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(CouchError::Request {
                request: request.describe(),
                status: response.status,
                reason: response.error_reason(),
            });
        }
        Ok(response)
    }

    pub async fn create_database(&mut self, db: &str) -> Result<DatabaseCreation, CouchError> {
        let request = CouchRequest::new(Method::Put, [db]);
        let response = self.send(&request).await?;
        if response.is_success() {
            return Ok(DatabaseCreation::Created);
        }
        if response.body["error"] == "file_exists" {
            return Ok(DatabaseCreation::AlreadyExists);
        }
        Err(CouchError::Request {
            request: request.describe(),
            status: response.status,
            reason: response.error_reason(),
        })
    }

    pub async fn delete_database(&mut self, db: &str) -> Result<(), CouchError> {
        self.execute(&CouchRequest::new(Method::Delete, [db]))
            .await
            .map(|_| ())
    }

    pub async fn put_security(&mut self, db: &str, security: &Value) -> Result<(), CouchError> {
        let request = CouchRequest::new(Method::Put, [db, "_security"]).json(security.clone());
        self.execute(&request).await.map(|_| ())
    }

    /// Create or update a document. `rev` is sent as a query parameter; the
    /// body is expected to carry it too.
    pub async fn put_document(
        &mut self,
        db: &str,
        id: &str,
        rev: Option<&Revision>,
        body: Value,
    ) -> Result<Revision, CouchError> {
        let mut request = CouchRequest::new(Method::Put, [db, id]).json(body);
        if let Some(rev) = rev {
            request = request.query("rev", rev.to_string());
        }
        let response = self.execute(&request).await?;
        response_revision(&request, &response)
    }

    /// Write many documents in one request.
    ///
    /// With `new_edits` false the server stores the given revisions as-is,
    /// which may add conflicting branches. The result array is parallel to
    /// `docs` for normal writes; CouchDB may omit successful entries when
    /// `new_edits` is false.
    pub async fn bulk_docs(
        &mut self,
        db: &str,
        docs: Vec<Value>,
        new_edits: bool,
    ) -> Result<Vec<BulkDocResult>, CouchError> {
        let body = if new_edits {
            json!({ "docs": docs })
        } else {
            json!({ "new_edits": false, "docs": docs })
        };
        let request = CouchRequest::new(Method::Post, [db, "_bulk_docs"]).json(body);
        let response = self.execute(&request).await?;
        serde_json::from_value(response.body).map_err(|e| CouchError::UnexpectedResponse {
            request: request.describe(),
            reason: e.to_string(),
        })
    }

    /// Upload one attachment against `rev`, returning the document's new
    /// revision.
    pub async fn put_attachment(
        &mut self,
        db: &str,
        doc_id: &str,
        name: &str,
        rev: &Revision,
        content_type: Option<&str>,
        body: RequestBody,
    ) -> Result<Revision, CouchError> {
        let request = CouchRequest::new(Method::Put, [db, doc_id, name])
            .query("rev", rev.to_string())
            .body(body, content_type.map(str::to_string));
        let response = self.execute(&request).await?;
        response_revision(&request, &response)
    }
}

fn response_revision(
    request: &CouchRequest,
    response: &CouchResponse,
) -> Result<Revision, CouchError> {
    let unexpected = |reason: String| CouchError::UnexpectedResponse {
        request: request.describe(),
        reason,
    };
    response.body["rev"]
        .as_str()
        .ok_or_else(|| unexpected("missing rev".to_string()))?
        .parse()
        .map_err(|e: crate::error::InvalidRevision| unexpected(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted outcomes and records what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: VecDeque<Result<CouchResponse, TransportError>>,
        sent: Vec<CouchRequest>,
        reconnects: usize,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<CouchResponse, TransportError>>) -> Self {
            Self {
                outcomes: outcomes.into(),
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, request: &CouchRequest) -> Result<CouchResponse, TransportError> {
            self.sent.push(request.clone());
            self.outcomes
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Disconnected("script exhausted".into())))
        }

        async fn reconnect(&mut self) -> Result<(), TransportError> {
            self.reconnects += 1;
            Ok(())
        }
    }

    fn ok(status: u16, body: Value) -> Result<CouchResponse, TransportError> {
        Ok(CouchResponse::new(status, body))
    }

    fn dropped() -> Result<CouchResponse, TransportError> {
        Err(TransportError::Disconnected("reset by peer".into()))
    }

    #[tokio::test]
    async fn test_put_document_sends_rev_and_parses_new_one() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![ok(
            201,
            json!({"ok": true, "id": "d", "rev": "2-bb"}),
        )]));
        let prev = Revision::new(1, "aa");
        let rev = store
            .put_document("db", "d", Some(&prev), json!({"_id": "d", "_rev": "1-aa"}))
            .await
            .unwrap();
        assert_eq!(rev, Revision::new(2, "bb"));
        let sent = &store.transport().sent[0];
        assert_eq!(sent.describe(), "PUT /db/d?rev=1-aa");
        assert_eq!(sent.body, RequestBody::Json(json!({"_id": "d", "_rev": "1-aa"})));
    }

    #[tokio::test]
    async fn test_transport_failure_retried_once() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![
            dropped(),
            ok(201, json!({"ok": true, "rev": "1-aa"})),
        ]));
        let rev = store.put_document("db", "d", None, json!({})).await.unwrap();
        assert_eq!(rev.generation(), 1);
        assert_eq!(store.reconnects(), 1);
        assert_eq!(store.transport().sent.len(), 2);
    }

    #[tokio::test]
    async fn test_second_transport_failure_surfaces() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![dropped(), dropped(), ok(201, json!({}))]));
        let err = store.put_document("db", "d", None, json!({})).await.unwrap_err();
        assert!(matches!(err, CouchError::Transport(_)));
        assert_eq!(store.transport().sent.len(), 2);
        assert_eq!(store.transport().reconnects, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_not_retried() {
        let file_error = Err(TransportError::File {
            path: "missing.bin".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        let mut store = CouchStore::new(ScriptedTransport::new(vec![file_error]));
        let err = store
            .put_attachment(
                "db",
                "d",
                "a",
                &Revision::new(1, "aa"),
                None,
                RequestBody::File("missing.bin".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CouchError::Transport(TransportError::File { .. })));
        assert_eq!(store.reconnects(), 0);
    }

    #[tokio::test]
    async fn test_create_database_outcomes() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![
            ok(201, json!({"ok": true})),
            ok(412, json!({"error": "file_exists", "reason": "The database could not be created, the file already exists."})),
            ok(401, json!({"error": "unauthorized", "reason": "nope"})),
        ]));
        assert_eq!(store.create_database("db").await.unwrap(), DatabaseCreation::Created);
        assert_eq!(store.create_database("db").await.unwrap(), DatabaseCreation::AlreadyExists);
        let err = store.create_database("db").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("unauthorized: nope"));
    }

    #[tokio::test]
    async fn test_bulk_docs_body_and_results() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![
            ok(201, json!([
                {"ok": true, "id": "a", "rev": "1-x"},
                {"id": "b", "error": "conflict", "reason": "Document update conflict."}
            ])),
            ok(201, json!([])),
        ]));
        let results = store
            .bulk_docs("db", vec![json!({"_id": "a"}), json!({"_id": "b"})], true)
            .await
            .unwrap();
        assert_eq!(results[0].revision(), Some(Revision::new(1, "x")));
        assert_eq!(results[1].revision(), None);
        assert_eq!(
            results[1].failure().as_deref(),
            Some("conflict: Document update conflict.")
        );

        let results = store.bulk_docs("db", vec![json!({"_id": "a", "_rev": "1-y"})], false).await.unwrap();
        assert!(results.is_empty());

        let sent = &store.transport().sent;
        assert_eq!(sent[0].body, RequestBody::Json(json!({"docs": [{"_id": "a"}, {"_id": "b"}]})));
        assert_eq!(
            sent[1].body,
            RequestBody::Json(json!({"new_edits": false, "docs": [{"_id": "a", "_rev": "1-y"}]}))
        );
    }

    #[tokio::test]
    async fn test_put_attachment_request_shape() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![ok(
            201,
            json!({"ok": true, "rev": "3-cc"}),
        )]));
        let rev = store
            .put_attachment(
                "db",
                "d",
                "note.txt",
                &Revision::new(2, "bb"),
                Some("text/plain"),
                RequestBody::Bytes(b"hi".to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(rev.to_string(), "3-cc");
        let sent = &store.transport().sent[0];
        assert_eq!(sent.describe(), "PUT /db/d/note.txt?rev=2-bb");
        assert_eq!(sent.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_missing_rev_is_unexpected() {
        let mut store = CouchStore::new(ScriptedTransport::new(vec![ok(201, json!({"ok": true}))]));
        let err = store.put_document("db", "d", None, json!({})).await.unwrap_err();
        assert!(matches!(err, CouchError::UnexpectedResponse { .. }));
    }
}
