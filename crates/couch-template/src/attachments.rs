//! Attachment extraction from resolved documents.

use crate::document::{AttachmentPayload, AttachmentSpec};
use crate::error::TemplateError;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// When file-backed attachment payloads are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentMode {
    /// Keep file references; the upload streams the file.
    Lazy,
    /// Read files into memory now (bulk requests inline every payload).
    Eager,
}

/// Match a `#{file(PATH)}` data reference.
pub fn file_reference(data: &str) -> Option<&str> {
    let path = data
        .trim()
        .strip_prefix("#{file(")?
        .strip_suffix(")}")?
        .trim();
    (!path.is_empty()).then_some(path)
}

/// Splits `_attachments` off a resolved document.
pub struct AttachmentResolver {
    mode: AttachmentMode,
}

impl AttachmentResolver {
    pub fn new(mode: AttachmentMode) -> Self {
        Self { mode }
    }

    /// Remove `_attachments` from `doc` and describe each entry.
    pub fn resolve(
        &self,
        mut doc: Map<String, Value>,
    ) -> Result<(Map<String, Value>, Vec<AttachmentSpec>), TemplateError> {
        let Some(attachments) = doc.shift_remove("_attachments") else {
            return Ok((doc, Vec::new()));
        };
        let Value::Object(attachments) = attachments else {
            return Err(TemplateError::AttachmentsNotObject);
        };

        let specs = attachments
            .into_iter()
            .map(|(name, details)| self.resolve_entry(name, details))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((doc, specs))
    }

    fn resolve_entry(&self, name: String, details: Value) -> Result<AttachmentSpec, TemplateError> {
        let Value::Object(details) = details else {
            return Err(TemplateError::AttachmentNotObject(name));
        };
        let content_type = details
            .get("content_type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = match details.get("data") {
            None => return Err(TemplateError::MissingAttachmentData(name)),
            Some(Value::String(data)) => data,
            Some(_) => return Err(TemplateError::AttachmentDataNotString(name)),
        };

        let payload = match file_reference(data) {
            Some(path) => {
                let path = PathBuf::from(path);
                match self.mode {
                    AttachmentMode::Lazy => AttachmentPayload::FileReference(path),
                    AttachmentMode::Eager => {
                        let bytes = std::fs::read(&path)
                            .map_err(|source| TemplateError::AttachmentFile { path, source })?;
                        AttachmentPayload::InlineBytes(bytes)
                    }
                }
            }
            None => AttachmentPayload::InlineBytes(data.as_bytes().to_vec()),
        };

        Ok(AttachmentSpec {
            name,
            content_type,
            payload,
        })
    }
}
