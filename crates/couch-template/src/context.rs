//! Per-document generation context.

/// Which configured prefix a `PrefixRef` placeholder refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    Db,
    User,
}

impl PrefixKind {
    /// Placeholder / variable name of the prefix.
    pub fn name(&self) -> &'static str {
        match self {
            PrefixKind::Db => "db_prefix",
            PrefixKind::User => "user_prefix",
        }
    }
}

/// Immutable inputs for rendering one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationContext<'a> {
    /// Numeric id counter of the document being generated.
    pub doc_id_counter: u64,
    /// Value of `#{db_prefix}`.
    pub db_prefix: &'a str,
    /// Value of `#{user_prefix}`.
    pub user_prefix: &'a str,
}

impl<'a> GenerationContext<'a> {
    pub fn new(doc_id_counter: u64, db_prefix: &'a str, user_prefix: &'a str) -> Self {
        Self {
            doc_id_counter,
            db_prefix,
            user_prefix,
        }
    }

    pub fn prefix(&self, kind: PrefixKind) -> &'a str {
        match kind {
            PrefixKind::Db => self.db_prefix,
            PrefixKind::User => self.user_prefix,
        }
    }
}
