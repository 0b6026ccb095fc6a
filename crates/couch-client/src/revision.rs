//! Document revision identifiers.

use crate::error::InvalidRevision;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A CouchDB revision, `generation-hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    generation: u64,
    hash: String,
}

impl Revision {
    pub fn new(generation: u64, hash: impl Into<String>) -> Self {
        Self {
            generation,
            hash: hash.into(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// A revision at the same generation with a fresh random hash.
    ///
    /// Written with `new_edits: false`, it becomes a conflicting leaf next to
    /// this one.
    pub fn conflicting_sibling(&self) -> Self {
        Self {
            generation: self.generation,
            hash: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

impl FromStr for Revision {
    type Err = InvalidRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRevision(s.to_string());
        let (generation, hash) = s.split_once('-').ok_or_else(invalid)?;
        let generation: u64 = generation.parse().map_err(|_| invalid())?;
        if generation == 0 || hash.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(generation, hash))
    }
}

impl TryFrom<String> for Revision {
    type Error = InvalidRevision;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.to_string()
    }
}
