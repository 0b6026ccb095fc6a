//! Rendered documents and their attachments.

use crate::attachments::{AttachmentMode, AttachmentResolver};
use crate::error::TemplateError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Where an attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentPayload {
    /// Raw bytes held in memory. Encoded to base64 only when inlined into a
    /// bulk request body.
    InlineBytes(Vec<u8>),
    /// File streamed at upload time.
    FileReference(PathBuf),
}

/// One entry of a document's `_attachments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub name: String,
    pub content_type: Option<String>,
    pub payload: AttachmentPayload,
}

impl AttachmentSpec {
    /// Inline stub for `_bulk_docs` bodies, or `None` for a file reference
    /// that was never loaded.
    pub fn to_inline_stub(&self) -> Option<Value> {
        let AttachmentPayload::InlineBytes(bytes) = &self.payload else {
            return None;
        };
        let mut stub = Map::new();
        stub.insert("data".to_string(), Value::String(BASE64.encode(bytes)));
        if let Some(content_type) = &self.content_type {
            stub.insert(
                "content_type".to_string(),
                Value::String(content_type.clone()),
            );
        }
        Some(Value::Object(stub))
    }
}

/// A fully rendered document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev: Option<String>,
    /// Every field except `_id`, `_rev` and `_attachments`, in template order.
    pub fields: Map<String, Value>,
    pub attachments: Vec<AttachmentSpec>,
}

impl Document {
    /// Build a document from a resolved template value.
    ///
    /// A missing `_id` is replaced with a random UUID. Numeric ids are turned
    /// into strings.
    pub fn from_value(value: Value, mode: AttachmentMode) -> Result<Self, TemplateError> {
        let Value::Object(map) = value else {
            return Err(TemplateError::NotAnObject);
        };
        let (mut fields, attachments) = AttachmentResolver::new(mode).resolve(map)?;

        let id = match fields.shift_remove("_id") {
            None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(TemplateError::InvalidId),
        };
        let rev = match fields.shift_remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            _ => None,
        };

        Ok(Self {
            id,
            rev,
            fields,
            attachments,
        })
    }

    /// Body for a single-document write: `_id`, `_rev` when known, then the
    /// fields. Attachments are uploaded separately.
    pub fn to_body(&self) -> Value {
        let mut body = Map::with_capacity(self.fields.len() + 2);
        body.insert("_id".to_string(), Value::String(self.id.clone()));
        if let Some(rev) = &self.rev {
            body.insert("_rev".to_string(), Value::String(rev.clone()));
        }
        for (key, value) in &self.fields {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }

    /// Body for a `_bulk_docs` entry, with attachments inlined as base64 stubs.
    pub fn to_bulk_body(&self) -> Value {
        let mut body = self.to_body();
        let stubs: Map<String, Value> = self
            .attachments
            .iter()
            .filter_map(|att| att.to_inline_stub().map(|stub| (att.name.clone(), stub)))
            .collect();
        if !stubs.is_empty() {
            if let Value::Object(map) = &mut body {
                map.insert("_attachments".to_string(), Value::Object(stubs));
            }
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_extracts_id_and_rev() {
        let doc = Document::from_value(
            json!({"_id": "a", "_rev": "1-abc", "x": 1}),
            AttachmentMode::Lazy,
        )
        .unwrap();
        assert_eq!(doc.id, "a");
        assert_eq!(doc.rev.as_deref(), Some("1-abc"));
        assert_eq!(Value::Object(doc.fields), json!({"x": 1}));
    }

    #[test]
    fn test_numeric_id_becomes_string() {
        let doc = Document::from_value(json!({"_id": 12}), AttachmentMode::Lazy).unwrap();
        assert_eq!(doc.id, "12");
    }

    #[test]
    fn test_missing_id_gets_uuid() {
        let doc = Document::from_value(json!({"x": 1}), AttachmentMode::Lazy).unwrap();
        assert!(uuid::Uuid::parse_str(&doc.id).is_ok());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            Document::from_value(json!([1]), AttachmentMode::Lazy),
            Err(TemplateError::NotAnObject)
        ));
        assert!(matches!(
            Document::from_value(json!({"_id": [1]}), AttachmentMode::Lazy),
            Err(TemplateError::InvalidId)
        ));
    }

    #[test]
    fn test_to_body_orders_id_rev_then_fields() {
        let mut doc =
            Document::from_value(json!({"b": 1, "_id": "d", "a": 2}), AttachmentMode::Lazy)
                .unwrap();
        doc.rev = Some("2-ff".to_string());
        let body = doc.to_body();
        let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["_id", "_rev", "b", "a"]);
    }

    #[test]
    fn test_bulk_body_inlines_attachments_once_encoded() {
        let doc = Document::from_value(
            json!({
                "_id": "d",
                "_attachments": {
                    "note.txt": {"data": "hello", "content_type": "text/plain"}
                }
            }),
            AttachmentMode::Eager,
        )
        .unwrap();
        assert!(doc.to_body().get("_attachments").is_none());
        assert_eq!(
            doc.to_bulk_body()["_attachments"],
            json!({"note.txt": {"data": "aGVsbG8=", "content_type": "text/plain"}})
        );
    }
}
