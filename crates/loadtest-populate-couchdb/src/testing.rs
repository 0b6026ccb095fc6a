//! In-memory CouchDB for tests.
//!
//! Implements enough of the wire protocol to drive the populator without a
//! server: databases, the security object, revision-checked document writes,
//! `_bulk_docs` with and without `new_edits`, and attachment uploads. Every
//! request is recorded and transport failures can be injected.

use couch_client::{
    Connector, CouchRequest, CouchResponse, Method, RequestBody, Revision, Transport,
    TransportError,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    /// Current mainline revision.
    pub rev: Revision,
    /// Body of the current revision, without `_id`, `_rev` and `_attachments`.
    pub body: Map<String, Value>,
    /// Every accepted mainline revision, oldest first.
    pub history: Vec<Revision>,
    /// Conflicting leaves written with `new_edits: false`.
    pub conflicts: Vec<Revision>,
    /// Attachment name to (content type, bytes). Inline bulk attachments keep
    /// their base64 text as bytes.
    pub attachments: BTreeMap<String, (Option<String>, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct StoredDatabase {
    pub docs: BTreeMap<String, StoredDoc>,
    pub security: Option<Value>,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, StoredDatabase>,
    requests: Vec<CouchRequest>,
    pending_failures: usize,
    reconnects: usize,
    next_hash: u64,
}

/// Shared in-memory server; clones talk to the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCouch {
    state: Arc<Mutex<ServerState>>,
}

fn result_error(id: &str, error: &str, reason: &str) -> Value {
    json!({"id": id, "error": error, "reason": reason})
}

fn response(status: u16, body: Value) -> CouchResponse {
    CouchResponse::new(status, body)
}

fn not_found(reason: &str) -> CouchResponse {
    response(404, json!({"error": "not_found", "reason": reason}))
}

fn conflict() -> CouchResponse {
    response(
        409,
        json!({"error": "conflict", "reason": "Document update conflict."}),
    )
}

impl InMemoryCouch {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` requests fail at the connection level.
    pub fn fail_next(&self, count: usize) {
        self.lock().pending_failures = count;
    }

    pub fn requests(&self) -> Vec<CouchRequest> {
        self.lock().requests.clone()
    }

    pub fn reconnects(&self) -> usize {
        self.lock().reconnects
    }

    pub fn database_names(&self) -> Vec<String> {
        self.lock().databases.keys().cloned().collect()
    }

    pub fn database(&self, db: &str) -> Option<StoredDatabase> {
        self.lock().databases.get(db).cloned()
    }

    pub fn document(&self, db: &str, id: &str) -> Option<StoredDoc> {
        self.lock()
            .databases
            .get(db)
            .and_then(|d| d.docs.get(id))
            .cloned()
    }

    /// Create a database directly, bypassing the request log.
    pub fn create_database(&self, db: &str) {
        self.lock()
            .databases
            .entry(db.to_string())
            .or_default();
    }

    fn handle(&self, request: &CouchRequest) -> Result<CouchResponse, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(TransportError::Disconnected(
                "injected failure".to_string(),
            ));
        }

        let path: Vec<&str> = request.path.iter().map(String::as_str).collect();
        Ok(match (request.method, path.as_slice()) {
            (Method::Put, [db]) => state.create_database(db),
            (Method::Delete, [db]) => match state.databases.remove(*db) {
                Some(_) => response(200, json!({"ok": true})),
                None => not_found("Database does not exist."),
            },
            (Method::Put, [db, "_security"]) => {
                let security = json_body(request);
                match state.databases.get_mut(*db) {
                    Some(database) => {
                        database.security = Some(security);
                        response(200, json!({"ok": true}))
                    }
                    None => not_found("Database does not exist."),
                }
            }
            (Method::Post, [db, "_bulk_docs"]) => state.bulk_docs(db, &json_body(request)),
            (Method::Put, [db, id]) => {
                let body = json_body(request);
                let rev = request
                    .query_param("rev")
                    .or_else(|| body["_rev"].as_str())
                    .map(str::to_string);
                match state.write_doc(db, id, rev.as_deref(), &body) {
                    Ok(new_rev) => response(201, json!({"ok": true, "id": id, "rev": new_rev.to_string()})),
                    Err(resp) => resp,
                }
            }
            (Method::Put, [db, id, name]) => {
                let bytes = match &request.body {
                    RequestBody::Bytes(bytes) => bytes.clone(),
                    RequestBody::File(path) => {
                        std::fs::read(path).map_err(|source| TransportError::File {
                            path: path.clone(),
                            source,
                        })?
                    }
                    RequestBody::Json(value) => value.to_string().into_bytes(),
                    RequestBody::Empty => Vec::new(),
                };
                let rev = request.query_param("rev").map(str::to_string);
                match state.put_attachment(db, id, name, rev.as_deref(), request.content_type.clone(), bytes) {
                    Ok(new_rev) => response(201, json!({"ok": true, "id": id, "rev": new_rev.to_string()})),
                    Err(resp) => resp,
                }
            }
            _ => response(400, json!({"error": "bad_request", "reason": "Unsupported request"})),
        })
    }
}

fn json_body(request: &CouchRequest) -> Value {
    match &request.body {
        RequestBody::Json(value) => value.clone(),
        _ => Value::Null,
    }
}

/// Fields stored for a document body.
fn strip_meta(body: &Value) -> (Map<String, Value>, Map<String, Value>) {
    let mut fields = body.as_object().cloned().unwrap_or_default();
    fields.shift_remove("_id");
    fields.shift_remove("_rev");
    let attachments = match fields.shift_remove("_attachments") {
        Some(Value::Object(atts)) => atts,
        _ => Map::new(),
    };
    (fields, attachments)
}

impl ServerState {
    fn fresh_hash(&mut self) -> String {
        self.next_hash += 1;
        format!("{:032x}", self.next_hash)
    }

    fn create_database(&mut self, db: &str) -> CouchResponse {
        if self.databases.contains_key(db) {
            return response(
                412,
                json!({"error": "file_exists", "reason": "The database could not be created, the file already exists."}),
            );
        }
        self.databases.insert(db.to_string(), StoredDatabase::default());
        response(201, json!({"ok": true}))
    }

    /// Revision-checked write of a new mainline revision.
    fn write_doc(
        &mut self,
        db: &str,
        id: &str,
        rev: Option<&str>,
        body: &Value,
    ) -> Result<Revision, CouchResponse> {
        let hash = self.fresh_hash();
        let database = self
            .databases
            .get_mut(db)
            .ok_or_else(|| not_found("Database does not exist."))?;
        let (fields, inline) = strip_meta(body);

        let new_rev = match (database.docs.get_mut(id), rev) {
            (None, None) => {
                let new_rev = Revision::new(1, hash);
                database.docs.insert(
                    id.to_string(),
                    StoredDoc {
                        rev: new_rev.clone(),
                        body: fields,
                        history: vec![new_rev.clone()],
                        conflicts: Vec::new(),
                        attachments: BTreeMap::new(),
                    },
                );
                new_rev
            }
            (Some(doc), Some(rev)) if doc.rev.to_string() == rev => {
                let new_rev = Revision::new(doc.rev.generation() + 1, hash);
                doc.rev = new_rev.clone();
                doc.body = fields;
                doc.history.push(new_rev.clone());
                new_rev
            }
            _ => return Err(conflict()),
        };

        if !inline.is_empty() {
            if let Some(doc) = database.docs.get_mut(id) {
                for (name, stub) in inline {
                    let content_type = stub["content_type"].as_str().map(str::to_string);
                    let data = stub["data"].as_str().unwrap_or_default().as_bytes().to_vec();
                    doc.attachments.insert(name, (content_type, data));
                }
            }
        }
        Ok(new_rev)
    }

    /// Store a revision as given, creating a conflict when it differs from
    /// the current one.
    fn replicate_doc(&mut self, db: &str, body: &Value) -> Option<Value> {
        let id = body["_id"].as_str().unwrap_or_default().to_string();
        let rev = match body["_rev"].as_str().map(str::parse::<Revision>) {
            Some(Ok(rev)) => rev,
            _ => return Some(result_error(&id, "bad_request", "Document must have a valid _rev")),
        };
        let Some(database) = self.databases.get_mut(db) else {
            return Some(result_error(&id, "not_found", "Database does not exist."));
        };
        let (fields, _) = strip_meta(body);
        match database.docs.get_mut(&id) {
            Some(doc) => {
                if doc.rev != rev && !doc.conflicts.contains(&rev) {
                    doc.conflicts.push(rev);
                }
            }
            None => {
                database.docs.insert(
                    id,
                    StoredDoc {
                        rev: rev.clone(),
                        body: fields,
                        history: vec![rev],
                        conflicts: Vec::new(),
                        attachments: BTreeMap::new(),
                    },
                );
            }
        }
        None
    }

    fn bulk_docs(&mut self, db: &str, body: &Value) -> CouchResponse {
        if !self.databases.contains_key(db) {
            return not_found("Database does not exist.");
        }
        let Some(docs) = body["docs"].as_array() else {
            return response(400, json!({"error": "bad_request", "reason": "Missing docs"}));
        };
        let new_edits = body["new_edits"].as_bool().unwrap_or(true);

        let mut results = Vec::new();
        for doc in docs {
            if new_edits {
                let id = match doc["_id"].as_str() {
                    Some(id) => id.to_string(),
                    None => {
                        let hash = self.fresh_hash();
                        format!("generated-{hash}")
                    }
                };
                let rev = doc["_rev"].as_str();
                results.push(match self.write_doc(db, &id, rev, doc) {
                    Ok(new_rev) => json!({"ok": true, "id": id, "rev": new_rev.to_string()}),
                    Err(_) => result_error(&id, "conflict", "Document update conflict."),
                });
            } else if let Some(error) = self.replicate_doc(db, doc) {
                // Successful replicated writes are omitted, as CouchDB does.
                results.push(error);
            }
        }
        response(201, Value::Array(results))
    }

    fn put_attachment(
        &mut self,
        db: &str,
        id: &str,
        name: &str,
        rev: Option<&str>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<Revision, CouchResponse> {
        let hash = self.fresh_hash();
        let doc = self
            .databases
            .get_mut(db)
            .and_then(|d| d.docs.get_mut(id))
            .ok_or_else(|| not_found("missing"))?;
        if rev != Some(doc.rev.to_string().as_str()) {
            return Err(conflict());
        }
        let new_rev = Revision::new(doc.rev.generation() + 1, hash);
        doc.rev = new_rev.clone();
        doc.history.push(new_rev.clone());
        doc.attachments.insert(name.to_string(), (content_type, bytes));
        Ok(new_rev)
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryCouch {
    async fn send(&mut self, request: &CouchRequest) -> Result<CouchResponse, TransportError> {
        self.handle(request)
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.lock().reconnects += 1;
        Ok(())
    }
}

impl Connector for InMemoryCouch {
    type Transport = InMemoryCouch;

    fn connect(&self) -> Result<InMemoryCouch, TransportError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_client::{CouchStore, DatabaseCreation};

    #[tokio::test]
    async fn test_revision_checks() {
        let server = InMemoryCouch::new();
        let mut store = CouchStore::new(server.clone());
        assert_eq!(
            store.create_database("db").await.unwrap(),
            DatabaseCreation::Created
        );

        let rev1 = store
            .put_document("db", "a", None, json!({"_id": "a", "x": 1}))
            .await
            .unwrap();
        assert_eq!(rev1.generation(), 1);

        // Stale or missing revisions conflict.
        let err = store
            .put_document("db", "a", None, json!({"_id": "a"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));

        let rev2 = store
            .put_document("db", "a", Some(&rev1), json!({"_id": "a", "_rev": rev1.to_string(), "x": 2}))
            .await
            .unwrap();
        assert_eq!(rev2.generation(), 2);
        let doc = server.document("db", "a").unwrap();
        assert_eq!(doc.history, vec![rev1, rev2.clone()]);
        assert_eq!(doc.body["x"], 2);
    }

    #[tokio::test]
    async fn test_replicated_writes_create_conflicts() {
        let server = InMemoryCouch::new();
        server.create_database("db");
        let mut store = CouchStore::new(server.clone());
        let rev = store
            .put_document("db", "a", None, json!({"_id": "a"}))
            .await
            .unwrap();
        let sibling = rev.conflicting_sibling();
        let results = store
            .bulk_docs("db", vec![json!({"_id": "a", "_rev": sibling.to_string()})], false)
            .await
            .unwrap();
        assert!(results.is_empty());
        let doc = server.document("db", "a").unwrap();
        assert_eq!(doc.rev, rev);
        assert_eq!(doc.conflicts, vec![sibling]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_retried_by_store() {
        let server = InMemoryCouch::new();
        server.fail_next(1);
        let mut store = CouchStore::new(server.clone());
        store.create_database("db").await.unwrap();
        assert_eq!(server.reconnects(), 1);
        assert_eq!(server.requests().len(), 2);
        assert_eq!(server.database_names(), vec!["db"]);
    }
}
