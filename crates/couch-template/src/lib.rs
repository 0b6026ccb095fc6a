//! Document template engine for the seatoncouch load generator.
//!
//! A template is plain JSON text sprinkled with `#{...}` placeholders. Each
//! document id is rendered from the same template, with fresh random draws
//! for every placeholder occurrence.
//!
//! # Pipeline
//!
//! ```text
//! template text
//!        │  tokenize (once)
//!        ▼
//!  Vec<Segment>  ──resolve(ctx, rng)──▶  JSON text  ──serde_json──▶  Value
//!                                                                    │
//!                                    ConditionalEvaluator (if(...))  │
//!                                    AttachmentResolver (_attachments)
//!                                                                    ▼
//!                                                                Document
//! ```
//!
//! # Placeholders
//!
//! - `#{doc_id_counter}` - the numeric id counter of the document
//! - `#{db_prefix}` / `#{user_prefix}` - configured prefixes
//! - `#{random_int(min, max)}` - uniform integer in `[min, max]`
//! - `#{random_string}` - alphanumeric string of 10 to 999 characters
//! - `#{random_string(k)}` - alphanumeric string of exactly `k` characters
//! - `#{pick(a, b, c)}` - one of the listed tokens
//! - `#{file(path)}` - attachment payload read from a file
//! - `#{if(expr)}name` - object key kept as `name` only when `expr` holds
//!
//! Call arguments may themselves hold placeholders, e.g.
//! `#{random_int(1, #{doc_id_counter})}`; they are resolved before the call.
//!
//! A `#` preceded by a backslash is never a placeholder; `\#` renders as `#`.
//!
//! # Example
//!
//! ```rust
//! use couch_template::{AttachmentMode, DocumentTemplate, GenerationContext};
//!
//! let template = DocumentTemplate::parse(r##"{"_id": "#{doc_id_counter}", "n": #{random_int(1, 1)}}"##).unwrap();
//! let ctx = GenerationContext::new(5, "testdb", "user");
//! let doc = template.render(&ctx, AttachmentMode::Lazy).unwrap();
//! assert_eq!(doc.id, "5");
//! assert_eq!(doc.fields["n"], 1);
//! ```

pub mod attachments;
pub mod conditional;
pub mod context;
pub mod document;
pub mod error;
pub mod expr;
pub mod resolve;
pub mod template;
pub mod token;

pub use attachments::{AttachmentMode, AttachmentResolver};
pub use conditional::ConditionalEvaluator;
pub use context::{GenerationContext, PrefixKind};
pub use document::{AttachmentPayload, AttachmentSpec, Document};
pub use error::TemplateError;
pub use template::DocumentTemplate;
pub use token::{CallKind, PlaceholderToken, Segment};
