// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change-feed event shapes.

use serde::{Deserialize, Serialize};

use crate::document::{DocId, Revision, Seq};

/// One entry of the backing store's sequence-ordered change feed.
///
/// The revision doubles as the visibility token at the source: it is the
/// version marker recorded in a user's visibility set when the document is
/// within view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub seq: Seq,
    pub id: DocId,
    pub revision: Revision,
    pub deleted: bool,
}

impl ChangeEvent {
    /// Minimal deletion marker substituted for an event the caller lost
    /// visibility of.
    ///
    /// The client's replication state machine treats this identically to an
    /// upstream delete and drops the document locally.
    pub fn deletion_stub(seq: Seq, id: DocId, revision: Revision) -> Self {
        Self {
            seq,
            id,
            revision,
            deleted: true,
        }
    }
}

/// Item type of a live change-feed connection.
///
/// Heartbeats carry no data; they only keep the client's long-poll from
/// timing out and must never be delayed by filtering or buffering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedEvent {
    Change(ChangeEvent),
    Heartbeat,
}

impl FeedEvent {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, FeedEvent::Heartbeat)
    }
}
