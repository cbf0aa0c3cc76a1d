// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purge-log entries and client checkpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{DocId, Revision, Seq};
use crate::identity::UserId;

/// One append-only purge-log entry: a document which left a user's
/// visibility (or was hard-deleted upstream while visible).
///
/// Ordered by `seq`, which is monotonic per user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeEntry {
    pub user: UserId,
    pub doc: DocId,
    pub revision: Revision,
    pub seq: Seq,
}

/// Client-held cursor into a user's purge log.
///
/// The sole durable state a client must retain to resume the purge feed.
/// Serializes to an opaque `user:seq` token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub user: UserId,
    pub seq: Seq,
}

impl Checkpoint {
    /// Cursor of a fresh client which has seen no purges yet.
    pub fn start(user: UserId) -> Self {
        Self {
            user,
            seq: Seq::new(0),
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.seq)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("malformed checkpoint token")]
pub struct CheckpointParseError;

impl FromStr for Checkpoint {
    type Err = CheckpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, seq) = s.rsplit_once(':').ok_or(CheckpointParseError)?;
        if user.is_empty() {
            return Err(CheckpointParseError);
        }
        let seq: u64 = seq.parse().map_err(|_| CheckpointParseError)?;
        Ok(Self {
            user: UserId::new(user),
            seq: Seq::new(seq),
        })
    }
}
