// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the gateway's external collaborators and durable
//! state.
//!
//! Two variants of each trait are provided: one which is thread-safe
//! (implementing `Send`) and one which is purely intended for
//! single-threaded execution contexts.
use std::fmt::{Debug, Display};

use futures_util::Stream;
use warden_core::{
    AuditRecord, BulkRow, Checkpoint, DocId, Document, FacilityId, FeedEvent, PurgeEntry, Revision,
    Seq, SessionClaims, UserId, WriteOutcome,
};

/// Interface to the backing document store.
///
/// The store is assumed to expose CRUD, bulk operations, a sequence-ordered
/// change feed, and the facility hierarchy the visibility resolver traverses.
/// This layer performs no validation of store responses beyond their shape.
#[trait_variant::make(DocumentStore: Send)]
pub trait LocalDocumentStore: Clone {
    type Error: Display + Debug;

    /// Live change feed starting after the given sequence.
    type Feed: Stream<Item = FeedEvent> + Unpin;

    /// Open the change feed for all events with a sequence greater than
    /// `since`. The returned stream owns its upstream subscription; dropping
    /// it releases the connection.
    async fn change_feed(&self, since: Seq) -> Result<Self::Feed, Self::Error>;

    /// Positional bulk read: one row per requested key, in request order.
    async fn bulk_read(&self, keys: &[DocId]) -> Result<Vec<BulkRow>, Self::Error>;

    /// Bulk write with per-document outcomes, in request order.
    ///
    /// A document whose revision is not the store's current one yields
    /// [`WriteOutcome::Conflict`]; the store never silently overwrites.
    async fn bulk_write(&mut self, docs: &[Document]) -> Result<Vec<WriteOutcome>, Self::Error>;

    /// Get a single document.
    async fn get_document(&self, id: &DocId) -> Result<Option<Document>, Self::Error>;

    /// Write a single document.
    async fn put_document(&mut self, doc: &Document) -> Result<WriteOutcome, Self::Error>;

    /// Delete a single document at the given revision, leaving a tombstone.
    async fn delete_document(
        &mut self,
        id: &DocId,
        revision: &Revision,
    ) -> Result<WriteOutcome, Self::Error>;

    /// Child facilities of a hierarchy node.
    ///
    /// Returns `None` when the facility is unknown.
    async fn children(&self, facility: &FacilityId) -> Result<Option<Vec<FacilityId>>, Self::Error>;

    /// Documents owned by a facility, excluding tombstones.
    async fn docs_in_facility(
        &self,
        facility: &FacilityId,
    ) -> Result<Vec<(DocId, Revision)>, Self::Error>;

    /// Documents independently owned by a user, excluding tombstones.
    async fn docs_owned_by(&self, user: &UserId) -> Result<Vec<(DocId, Revision)>, Self::Error>;

    /// Version counter bumped on every hierarchy, ownership, or document-set
    /// change — including committed writes.
    ///
    /// Keys the visibility cache so permission changes and fresh documents
    /// invalidate promptly.
    async fn hierarchy_version(&self) -> Result<u64, Self::Error>;
}

/// Interface to the external identity provider.
#[trait_variant::make(IdentityProvider: Send)]
pub trait LocalIdentityProvider: Clone {
    type Error: Display + Debug;

    /// Validate a credential token.
    ///
    /// Returns `None` for any rejection — unknown user, bad token, expired
    /// session. The provider does not distinguish these to the caller.
    async fn validate(&self, credential: &str) -> Result<Option<SessionClaims>, Self::Error>;

    /// Extend the credential's expiry after a successful validation.
    async fn refresh(&mut self, credential: &str) -> Result<(), Self::Error>;
}

/// Durable per-document audit records.
///
/// Records are created on first sight and updated afterwards, never deleted.
/// Writers for different document ids must not contend with each other.
#[trait_variant::make(AuditStore: Send)]
pub trait LocalAuditStore: Clone {
    type Error: Display + Debug;

    async fn get_audit(&self, doc: &DocId) -> Result<Option<AuditRecord>, Self::Error>;

    /// Create the record on first write, else fold the write into it.
    async fn stamp_audit(
        &mut self,
        doc: &DocId,
        writer: &UserId,
        at: u64,
    ) -> Result<AuditRecord, Self::Error>;
}

/// Append-only per-user purge log.
#[trait_variant::make(PurgeStore: Send)]
pub trait LocalPurgeStore: Clone {
    type Error: Display + Debug;

    /// Append an entry and return its sequence, monotonic per user.
    async fn append_purge(
        &mut self,
        user: &UserId,
        doc: &DocId,
        revision: &Revision,
    ) -> Result<Seq, Self::Error>;

    /// All entries for a user with a sequence greater than the checkpoint's.
    async fn purges_since(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<Vec<PurgeEntry>, Self::Error>;

    /// Highest sequence appended for a user so far, `0` when none.
    async fn purge_head(&self, user: &UserId) -> Result<Seq, Self::Error>;
}
