// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document identifiers and record shapes of the backing store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{FacilityId, UserId};

/// Stable identifier of a document in the backing store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque revision marker assigned by the backing store.
///
/// Revisions are compared only for equality; the gateway never parses or
/// orders them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Position in a sequence-ordered feed.
///
/// Monotonically increasing from the backing store's perspective. Gaps are
/// allowed across restarts but entries are never reordered.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Seq(u64);

impl Seq {
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Seq {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Ownership marker deciding which users may see a document.
///
/// A document is owned by a facility, by a single user (self-authored
/// records), or both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocOwner {
    pub facility: Option<FacilityId>,
    pub user: Option<UserId>,
}

impl DocOwner {
    pub fn facility(facility: FacilityId) -> Self {
        Self {
            facility: Some(facility),
            user: None,
        }
    }

    pub fn user(user: UserId) -> Self {
        Self {
            facility: None,
            user: Some(user),
        }
    }
}

/// A document as exchanged with the backing store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub revision: Revision,
    pub deleted: bool,
    pub owner: DocOwner,
    pub body: serde_json::Value,
}

impl Document {
    pub fn new(id: DocId, revision: Revision, owner: DocOwner, body: serde_json::Value) -> Self {
        Self {
            id,
            revision,
            deleted: false,
            owner,
            body,
        }
    }
}

/// One positional row of a bulk-read response.
///
/// Rows are never omitted: a document the caller may not see is replaced by
/// [`BulkRow::Forbidden`] so index alignment with the request's key list is
/// preserved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BulkRow {
    Doc(Document),
    NotFound { id: DocId },
    Forbidden { id: DocId },
}

impl BulkRow {
    /// The document id this row answers for.
    pub fn id(&self) -> &DocId {
        match self {
            BulkRow::Doc(doc) => &doc.id,
            BulkRow::NotFound { id } => id,
            BulkRow::Forbidden { id } => id,
        }
    }
}

/// Per-document result of a bulk write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    Ok { id: DocId, revision: Revision },
    /// The given revision is not the store's current one. Retryable by the
    /// caller after a fresh read; never silently overwritten.
    Conflict { id: DocId },
    Forbidden { id: DocId },
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok { .. })
    }
}
