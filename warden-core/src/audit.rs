// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-document write provenance.

use serde::{Deserialize, Serialize};

use crate::document::DocId;
use crate::identity::UserId;

/// Durable metadata tracking who wrote a document and when, independent of
/// the document's own content.
///
/// Created when the gateway first sees a write for a document, updated on
/// every later write, never deleted. Owned exclusively by the write pipeline;
/// read-only to everything else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub doc: DocId,
    /// Unix seconds of the first write seen by the gateway.
    pub first_replicated_at: u64,
    /// Unix seconds of the most recent write.
    pub latest_write_at: u64,
    pub writer: UserId,
}

impl AuditRecord {
    pub fn first_write(doc: DocId, writer: UserId, at: u64) -> Self {
        Self {
            doc,
            first_replicated_at: at,
            latest_write_at: at,
            writer,
        }
    }

    /// Fold a later write into the record. `first_replicated_at` is fixed at
    /// creation and never moves.
    pub fn record_write(&mut self, writer: UserId, at: u64) {
        self.latest_write_at = at;
        self.writer = writer;
    }
}
