//! Deterministic revision identifiers.
//!
//! Every revision in every migration tree is named by a 12-character hex
//! string derived from the tuple that describes it. Nothing about the id is
//! random: the same tuple produces the same id on every machine, which is what
//! lets the applied-revision ledger be cross-checked against the recorded
//! component versions without storing a mapping anywhere.
//!
//! ## Arity
//!
//! - Tree roots use one part: `(component)`.
//! - Steps use three parts: `(component, class, version)`.
//!
//! Mixing arities can make ids of unrelated entities collide
//! (`("a-b", "c")` and `("a", "b-c")` join to the same name), so prefer the
//! typed constructors [`RevisionId::root`] and [`RevisionId::step`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::UsageError;

/// Namespace UUID used for UUID5 generation.
///
/// Do not change. This is `uuid5(NAMESPACE_DNS, "lsst.org")`, and every
/// revision id ever recorded in a ledger depends on it.
pub const REVISION_NAMESPACE: Uuid = Uuid::from_u128(0x840b31d9_05cd_5161_b2c8_00d32b280d0f);

/// Number of hex characters in a revision id.
pub const REVISION_ID_LEN: usize = 12;

/// Separator used to join id parts before hashing.
const PART_SEPARATOR: &str = "-";

/// Identifier of a single revision (migration step or tree root).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    /// Wrap a string read back from a ledger without validating it.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a strictly formatted id: exactly 12 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, UsageError> {
        let well_formed = s.len() == REVISION_ID_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(UsageError::MalformedRevisionId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Id of the root revision of a component's tree.
    pub fn root(component: &str) -> Self {
        rev_id(&[component])
    }

    /// Id of the step introducing `version` of `class_name` in a component's tree.
    pub fn step(component: &str, class_name: &str, version: &str) -> Self {
        rev_id(&[component, class_name, version])
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RevisionId {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RevisionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a revision id from an ordered tuple of parts.
///
/// Parts are joined with `"-"`, hashed into a version-5 UUID under
/// [`REVISION_NAMESPACE`], and the trailing 12 hex characters are kept.
/// Callers are expected to pass non-empty parts; see [`try_rev_id`] for a
/// checked variant.
pub fn rev_id(parts: &[&str]) -> RevisionId {
    let name = parts.join(PART_SEPARATOR);
    let uuid = Uuid::new_v5(&REVISION_NAMESPACE, name.as_bytes());
    let hex = uuid.simple().to_string();
    RevisionId(hex[hex.len() - REVISION_ID_LEN..].to_string())
}

/// Checked variant of [`rev_id`] that rejects an empty tuple or empty parts.
pub fn try_rev_id(parts: &[&str]) -> Result<RevisionId, UsageError> {
    if parts.is_empty() {
        return Err(UsageError::EmptyRevisionParts);
    }
    if let Some(position) = parts.iter().position(|p| p.is_empty()) {
        return Err(UsageError::EmptyRevisionPart { position });
    }
    Ok(rev_id(parts))
}
