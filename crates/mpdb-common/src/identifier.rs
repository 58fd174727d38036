//! Structure identifiers
//!
//! Every accession that crosses a boundary (set construction, provider response
//! parsing, recovery from a file name) goes through [`Identifier::new`], so two
//! identifiers differing only in case are the same value.

use crate::error::{MpdbError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Ordered set of identifiers.
///
/// Ordered so request bodies and the curated output are reproducible.
pub type IdentifierSet = BTreeSet<Identifier>;

/// Canonical (trimmed, lowercase) structure accession
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Canonicalize a raw accession.
    ///
    /// Rejects empty input and anything containing whitespace or a path
    /// separator, since identifiers double as file names.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(MpdbError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Reduce a longer reference to its four-character entry code.
    ///
    /// Polymer entity ids (`1CBS_1`) and MemProtMD simulation references
    /// (`1cbs_default_dppc`) both start with the entry code.
    pub fn pdb_code(raw: &str) -> Result<Self> {
        let code: String = raw.trim().chars().take(4).collect();
        Self::new(&code)
    }

    /// Recover an identifier from a file name with the given suffix.
    ///
    /// The suffix comparison ignores case. Returns `None` for names that do not
    /// carry the suffix.
    pub fn from_file_name(name: &str, suffix: &str) -> Option<Self> {
        if name.len() <= suffix.len() || !name.is_char_boundary(name.len() - suffix.len()) {
            return None;
        }
        let (stem, tail) = name.split_at(name.len() - suffix.len());
        if !tail.eq_ignore_ascii_case(suffix) {
            return None;
        }
        Self::new(stem).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = MpdbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = MpdbError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Canonicalize a list of raw accessions into a set, dropping duplicates.
pub fn identifier_set<I, S>(raw: I) -> Result<IdentifierSet>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter().map(|id| Identifier::new(id.as_ref())).collect()
}
