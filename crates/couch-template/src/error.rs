//! Error types for template loading and expansion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, tokenizing or expanding a document template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("Couldn't open the doc template file '{}': {source}", path.display())]
    TemplateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing is left once comments and blank lines are stripped.
    #[error("Doc template is empty")]
    EmptyTemplate,

    /// A known placeholder has malformed arguments.
    #[error("Invalid placeholder '{placeholder}': {reason}")]
    InvalidPlaceholder { placeholder: String, reason: String },

    /// A placeholder was opened but never closed.
    #[error("Unterminated placeholder at byte offset {0}")]
    UnterminatedPlaceholder(usize),

    /// The resolved text is not JSON.
    #[error("Resolved template is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The resolved JSON is not an object.
    #[error("Resolved template must be a JSON object")]
    NotAnObject,

    /// The `_id` field is neither a string nor a number.
    #[error("The _id attribute must be a string or a number")]
    InvalidId,

    /// A conditional expression failed to parse or evaluate.
    #[error("Invalid conditional expression '{expr}': {reason}")]
    Expression { expr: String, reason: String },

    #[error("The _attachments attribute of the doc template must be an object")]
    AttachmentsNotObject,

    #[error("The _attachments/{0} attribute of the doc template must be an object")]
    AttachmentNotObject(String),

    #[error("Missing data attribute for the attachment named '{0}'")]
    MissingAttachmentData(String),

    #[error("The data attribute of the attachment named '{0}' must be a string")]
    AttachmentDataNotString(String),

    /// An eagerly resolved attachment file could not be read.
    #[error("Couldn't read attachment file '{}': {source}", path.display())]
    AttachmentFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    pub(crate) fn expression(expr: &str, reason: impl Into<String>) -> Self {
        TemplateError::Expression {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}
