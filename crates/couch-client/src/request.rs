//! Transport-independent request and response values.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
    /// Streamed from disk when the request is sent.
    File(PathBuf),
}

/// One request against the server.
///
/// `path` holds unencoded segments; transports percent-encode them.
#[derive(Debug, Clone, PartialEq)]
pub struct CouchRequest {
    pub method: Method,
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: RequestBody,
}

impl CouchRequest {
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            content_type: None,
            body: RequestBody::Empty,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.content_type = Some("application/json".to_string());
        self.body = RequestBody::Json(body);
        self
    }

    pub fn body(mut self, body: RequestBody, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self.body = body;
        self
    }

    /// Value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Short form for logs, e.g. `PUT /db/doc?rev=1-abc`.
    pub fn describe(&self) -> String {
        let mut out = format!("{} /{}", self.method, self.path.join("/"));
        for (i, (key, value)) in self.query.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

/// Status and body of a server response.
///
/// Bodies that are not JSON are kept as a string value; empty bodies are null.
#[derive(Debug, Clone, PartialEq)]
pub struct CouchResponse {
    pub status: u16,
    pub body: Value,
}

impl CouchResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn from_bytes(status: u16, bytes: &[u8]) -> Self {
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
        };
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error: reason` from a CouchDB error body, or the raw body.
    pub fn error_reason(&self) -> String {
        match (&self.body["error"], &self.body["reason"]) {
            (Value::String(error), Value::String(reason)) => format!("{error}: {reason}"),
            (Value::String(error), _) => error.clone(),
            _ => match &self.body {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe() {
        let req = CouchRequest::new(Method::Put, ["db", "doc"]).query("rev", "1-a");
        assert_eq!(req.describe(), "PUT /db/doc?rev=1-a");
        assert_eq!(req.query_param("rev"), Some("1-a"));
        assert_eq!(CouchRequest::new(Method::Delete, ["db"]).describe(), "DELETE /db");
    }

    #[test]
    fn test_response_body_parsing() {
        assert_eq!(
            CouchResponse::from_bytes(201, br#"{"ok":true}"#).body,
            json!({"ok": true})
        );
        assert_eq!(
            CouchResponse::from_bytes(500, b"oops").body,
            json!("oops")
        );
        assert_eq!(CouchResponse::from_bytes(200, b"").body, Value::Null);
    }

    #[test]
    fn test_error_reason() {
        let resp = CouchResponse::new(409, json!({"error": "conflict", "reason": "Document update conflict."}));
        assert_eq!(resp.error_reason(), "conflict: Document update conflict.");
        assert!(!resp.is_success());
        assert_eq!(CouchResponse::new(502, json!("bad gateway")).error_reason(), "bad gateway");
    }
}
