// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of all warden store seams.
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::stream;
use thiserror::Error;
use warden_core::{
    AuditRecord, BulkRow, ChangeEvent, Checkpoint, DocId, Document, FacilityId, FeedEvent,
    PurgeEntry, Revision, Seq, SessionClaims, UserId, WriteOutcome,
};

use crate::traits::{AuditStore, DocumentStore, IdentityProvider, PurgeStore};

#[derive(Error, Debug)]
pub enum MemoryStoreError {
    /// Raised by fault injection to exercise upstream-unavailable paths.
    #[error("store unreachable")]
    Unreachable,
}

/// Backing state for [`MemoryStore`].
#[derive(Debug, Default)]
pub struct InnerMemoryStore {
    facilities: HashMap<FacilityId, Vec<FacilityId>>,
    documents: HashMap<DocId, Document>,
    feed: Vec<FeedEvent>,
    audits: HashMap<DocId, AuditRecord>,
    purges: HashMap<UserId, Vec<PurgeEntry>>,
    hierarchy_version: u64,
    next_seq: u64,
    next_rev: u64,
    fail_reads: u32,
    fail_writes: u32,
    fail_audits: u32,
}

/// An in-memory document store, audit table and purge log in one handle.
///
/// `MemoryStore` supports usage in asynchronous and multi-threaded contexts
/// by wrapping an [`InnerMemoryStore`] with an `RwLock` and `Arc`. Cloning is
/// cheap and all clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a read-lock on the store.
    pub fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtain a write-lock on the store.
    pub fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }

    /// Register a facility, optionally under a parent. Bumps the hierarchy
    /// version.
    pub fn insert_facility(&self, facility: FacilityId, parent: Option<&FacilityId>) {
        let mut store = self.write_store();
        store.facilities.entry(facility.clone()).or_default();
        if let Some(parent) = parent {
            store
                .facilities
                .entry(parent.clone())
                .or_default()
                .push(facility);
        }
        store.hierarchy_version += 1;
    }

    /// Seed a document directly, bypassing the write path. Assigns a fresh
    /// revision and emits a change event.
    pub fn insert_document(&self, doc: Document) -> Revision {
        let mut store = self.write_store();
        apply_write(&mut store, &doc)
    }

    /// Move a document to another owning facility.
    ///
    /// Models the upstream hierarchy reassignment which makes documents leave
    /// a user's visibility: bumps the document revision, emits a change event
    /// and bumps the hierarchy version.
    pub fn reassign_document(&self, id: &DocId, facility: FacilityId) {
        let mut store = self.write_store();
        let Some(mut doc) = store.documents.get(id).cloned() else {
            return;
        };
        doc.owner.facility = Some(facility);
        apply_write(&mut store, &doc);
    }

    /// Append a keepalive signal to the feed.
    pub fn push_heartbeat(&self) {
        self.write_store().feed.push(FeedEvent::Heartbeat);
    }

    /// Fail the next `n` read operations with [`MemoryStoreError::Unreachable`].
    pub fn fail_next_reads(&self, n: u32) {
        self.write_store().fail_reads = n;
    }

    /// Fail the next `n` write operations with [`MemoryStoreError::Unreachable`].
    pub fn fail_next_writes(&self, n: u32) {
        self.write_store().fail_writes = n;
    }

    /// Fail the next `n` audit stamps with [`MemoryStoreError::Unreachable`].
    pub fn fail_next_audits(&self, n: u32) {
        self.write_store().fail_audits = n;
    }

    /// Number of audit records held, for batch-atomicity assertions.
    pub fn audit_count(&self) -> usize {
        self.read_store().audits.len()
    }

    fn check_read(&self) -> Result<(), MemoryStoreError> {
        let mut store = self.write_store();
        if store.fail_reads > 0 {
            store.fail_reads -= 1;
            return Err(MemoryStoreError::Unreachable);
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), MemoryStoreError> {
        let mut store = self.write_store();
        if store.fail_writes > 0 {
            store.fail_writes -= 1;
            return Err(MemoryStoreError::Unreachable);
        }
        Ok(())
    }
}

/// Store a document under a freshly assigned revision and record the change
/// in the feed. Callers have already passed the revision conflict check.
fn apply_write(store: &mut InnerMemoryStore, doc: &Document) -> Revision {
    let generation = store
        .documents
        .get(&doc.id)
        .and_then(|existing| existing.revision.as_str().split('-').next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    store.next_rev += 1;
    let revision = Revision::new(format!("{}-mem{}", generation + 1, store.next_rev));

    let mut stored = doc.clone();
    stored.revision = revision.clone();

    store.next_seq += 1;
    store.feed.push(FeedEvent::Change(ChangeEvent {
        seq: Seq::new(store.next_seq),
        id: doc.id.clone(),
        revision: revision.clone(),
        deleted: doc.deleted,
    }));
    store.documents.insert(doc.id.clone(), stored);
    // Every committed write changes the document set, which the version
    // counter covers alongside hierarchy and ownership changes.
    store.hierarchy_version += 1;
    revision
}

fn write_one(store: &mut InnerMemoryStore, doc: &Document) -> WriteOutcome {
    if let Some(existing) = store.documents.get(&doc.id) {
        if existing.revision != doc.revision {
            return WriteOutcome::Conflict {
                id: doc.id.clone(),
            };
        }
    }
    let revision = apply_write(store, doc);
    WriteOutcome::Ok {
        id: doc.id.clone(),
        revision,
    }
}

impl DocumentStore for MemoryStore {
    type Error = MemoryStoreError;
    type Feed = stream::Iter<std::vec::IntoIter<FeedEvent>>;

    async fn change_feed(&self, since: Seq) -> Result<Self::Feed, Self::Error> {
        self.check_read()?;
        // Bounded replay of the recorded feed. Heartbeats carry no sequence
        // and are always replayed in position.
        let events: Vec<FeedEvent> = self
            .read_store()
            .feed
            .iter()
            .filter(|event| match event {
                FeedEvent::Change(change) => change.seq > since,
                FeedEvent::Heartbeat => true,
            })
            .cloned()
            .collect();
        Ok(stream::iter(events))
    }

    async fn bulk_read(&self, keys: &[DocId]) -> Result<Vec<BulkRow>, Self::Error> {
        self.check_read()?;
        let store = self.read_store();
        let rows = keys
            .iter()
            .map(|id| match store.documents.get(id) {
                Some(doc) => BulkRow::Doc(doc.clone()),
                None => BulkRow::NotFound { id: id.clone() },
            })
            .collect();
        Ok(rows)
    }

    async fn bulk_write(&mut self, docs: &[Document]) -> Result<Vec<WriteOutcome>, Self::Error> {
        self.check_write()?;
        let mut store = self.write_store();
        Ok(docs.iter().map(|doc| write_one(&mut store, doc)).collect())
    }

    async fn get_document(&self, id: &DocId) -> Result<Option<Document>, Self::Error> {
        self.check_read()?;
        Ok(self.read_store().documents.get(id).cloned())
    }

    async fn put_document(&mut self, doc: &Document) -> Result<WriteOutcome, Self::Error> {
        self.check_write()?;
        let mut store = self.write_store();
        Ok(write_one(&mut store, doc))
    }

    async fn delete_document(
        &mut self,
        id: &DocId,
        revision: &Revision,
    ) -> Result<WriteOutcome, Self::Error> {
        self.check_write()?;
        let mut store = self.write_store();
        let Some(existing) = store.documents.get(id) else {
            return Ok(WriteOutcome::Conflict { id: id.clone() });
        };
        let mut tombstone = existing.clone();
        tombstone.revision = revision.clone();
        tombstone.deleted = true;
        tombstone.body = serde_json::Value::Null;
        Ok(write_one(&mut store, &tombstone))
    }

    async fn children(
        &self,
        facility: &FacilityId,
    ) -> Result<Option<Vec<FacilityId>>, Self::Error> {
        self.check_read()?;
        Ok(self.read_store().facilities.get(facility).cloned())
    }

    async fn docs_in_facility(
        &self,
        facility: &FacilityId,
    ) -> Result<Vec<(DocId, Revision)>, Self::Error> {
        self.check_read()?;
        let store = self.read_store();
        Ok(store
            .documents
            .values()
            .filter(|doc| !doc.deleted && doc.owner.facility.as_ref() == Some(facility))
            .map(|doc| (doc.id.clone(), doc.revision.clone()))
            .collect())
    }

    async fn docs_owned_by(&self, user: &UserId) -> Result<Vec<(DocId, Revision)>, Self::Error> {
        self.check_read()?;
        let store = self.read_store();
        Ok(store
            .documents
            .values()
            .filter(|doc| !doc.deleted && doc.owner.user.as_ref() == Some(user))
            .map(|doc| (doc.id.clone(), doc.revision.clone()))
            .collect())
    }

    async fn hierarchy_version(&self) -> Result<u64, Self::Error> {
        self.check_read()?;
        Ok(self.read_store().hierarchy_version)
    }
}

impl AuditStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn get_audit(&self, doc: &DocId) -> Result<Option<AuditRecord>, Self::Error> {
        Ok(self.read_store().audits.get(doc).cloned())
    }

    async fn stamp_audit(
        &mut self,
        doc: &DocId,
        writer: &UserId,
        at: u64,
    ) -> Result<AuditRecord, Self::Error> {
        let mut store = self.write_store();
        if store.fail_audits > 0 {
            store.fail_audits -= 1;
            return Err(MemoryStoreError::Unreachable);
        }
        let record = store
            .audits
            .entry(doc.clone())
            .and_modify(|record| record.record_write(writer.clone(), at))
            .or_insert_with(|| AuditRecord::first_write(doc.clone(), writer.clone(), at));
        Ok(record.clone())
    }
}

impl PurgeStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn append_purge(
        &mut self,
        user: &UserId,
        doc: &DocId,
        revision: &Revision,
    ) -> Result<Seq, Self::Error> {
        let mut store = self.write_store();
        let log = store.purges.entry(user.clone()).or_default();
        let seq = Seq::new(log.len() as u64 + 1);
        log.push(PurgeEntry {
            user: user.clone(),
            doc: doc.clone(),
            revision: revision.clone(),
            seq,
        });
        Ok(seq)
    }

    async fn purges_since(&self, checkpoint: &Checkpoint) -> Result<Vec<PurgeEntry>, Self::Error> {
        let store = self.read_store();
        let entries = store
            .purges
            .get(&checkpoint.user)
            .map(|log| {
                log.iter()
                    .filter(|entry| entry.seq > checkpoint.seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    async fn purge_head(&self, user: &UserId) -> Result<Seq, Self::Error> {
        let store = self.read_store();
        let head = store
            .purges
            .get(user)
            .and_then(|log| log.last())
            .map(|entry| entry.seq)
            .unwrap_or_default();
        Ok(head)
    }
}

#[derive(Debug, Default)]
struct InnerMemoryIdentity {
    sessions: HashMap<String, SessionClaims>,
    refreshes: HashMap<String, u32>,
    fail: u32,
}

/// In-memory identity provider keyed by credential token.
#[derive(Clone, Debug, Default)]
pub struct MemoryIdentity {
    inner: Arc<RwLock<InnerMemoryIdentity>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential and the claims it validates to.
    pub fn register(&self, credential: impl Into<String>, claims: SessionClaims) {
        self.inner
            .write()
            .expect("acquire exclusive write access on identity state")
            .sessions
            .insert(credential.into(), claims);
    }

    /// How often a credential's expiry was refreshed.
    pub fn refresh_count(&self, credential: &str) -> u32 {
        self.inner
            .read()
            .expect("acquire shared read access on identity state")
            .refreshes
            .get(credential)
            .copied()
            .unwrap_or(0)
    }

    /// Fail the next `n` provider calls with [`MemoryStoreError::Unreachable`].
    pub fn fail_next(&self, n: u32) {
        self.inner
            .write()
            .expect("acquire exclusive write access on identity state")
            .fail = n;
    }

    fn check(&self) -> Result<(), MemoryStoreError> {
        let mut inner = self
            .inner
            .write()
            .expect("acquire exclusive write access on identity state");
        if inner.fail > 0 {
            inner.fail -= 1;
            return Err(MemoryStoreError::Unreachable);
        }
        Ok(())
    }
}

impl IdentityProvider for MemoryIdentity {
    type Error = MemoryStoreError;

    async fn validate(&self, credential: &str) -> Result<Option<SessionClaims>, Self::Error> {
        self.check()?;
        Ok(self
            .inner
            .read()
            .expect("acquire shared read access on identity state")
            .sessions
            .get(credential)
            .cloned())
    }

    async fn refresh(&mut self, credential: &str) -> Result<(), Self::Error> {
        self.check()?;
        let mut inner = self
            .inner
            .write()
            .expect("acquire exclusive write access on identity state");
        *inner.refreshes.entry(credential.to_string()).or_default() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use warden_core::{
        Checkpoint, DocId, DocOwner, Document, FeedEvent, Revision, Seq, UserId, WriteOutcome,
    };

    use crate::traits::{AuditStore, DocumentStore, PurgeStore};

    use super::MemoryStore;

    fn doc(id: &str, facility: &str) -> Document {
        Document::new(
            DocId::from(id),
            Revision::from(""),
            DocOwner::facility(facility.into()),
            serde_json::json!({ "type": "record" }),
        )
    }

    #[tokio::test]
    async fn feed_replays_changes_after_since() {
        let store = MemoryStore::new();
        store.insert_document(doc("doc-1", "clinic-1"));
        store.insert_document(doc("doc-2", "clinic-1"));
        store.push_heartbeat();
        store.insert_document(doc("doc-3", "clinic-1"));

        let events: Vec<FeedEvent> = store
            .change_feed(Seq::new(1))
            .await
            .expect("feed opens")
            .collect()
            .await;

        // doc-1 (seq 1) is excluded, the heartbeat stays in position.
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], FeedEvent::Change(c) if c.id == "doc-2".into()));
        assert!(events[1].is_heartbeat());
        assert!(matches!(&events[2], FeedEvent::Change(c) if c.id == "doc-3".into()));
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let mut store = MemoryStore::new();
        let rev = store.insert_document(doc("doc-1", "clinic-1"));

        let mut update = doc("doc-1", "clinic-1");
        update.revision = rev;
        let outcomes = store.bulk_write(&[update.clone()]).await.expect("writes");
        assert!(outcomes[0].is_ok());

        // Re-submitting the now-stale revision must conflict.
        let outcomes = store.bulk_write(&[update]).await.expect("writes");
        assert_eq!(
            outcomes[0],
            WriteOutcome::Conflict {
                id: "doc-1".into()
            }
        );
    }

    #[tokio::test]
    async fn purge_log_is_monotonic_per_user() {
        let mut store = MemoryStore::new();
        let anna = UserId::from("chw-anna");
        let ben = UserId::from("chw-ben");

        let s1 = store
            .append_purge(&anna, &"doc-1".into(), &"1-a".into())
            .await
            .expect("appends");
        let s2 = store
            .append_purge(&anna, &"doc-2".into(), &"1-b".into())
            .await
            .expect("appends");
        let s3 = store
            .append_purge(&ben, &"doc-3".into(), &"1-c".into())
            .await
            .expect("appends");

        assert!(s2 > s1);
        assert_eq!(s3, Seq::new(1));

        let entries = store
            .purges_since(&Checkpoint::start(anna))
            .await
            .expect("reads");
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn every_write_bumps_the_hierarchy_version() {
        let mut store = MemoryStore::new();
        let before = store.hierarchy_version().await.expect("reads");

        let rev = store.insert_document(doc("doc-1", "clinic-1"));
        let seeded = store.hierarchy_version().await.expect("reads");
        assert!(seeded > before);

        let mut update = doc("doc-1", "clinic-1");
        update.revision = rev;
        store.put_document(&update).await.expect("writes");
        let written = store.hierarchy_version().await.expect("reads");
        assert!(written > seeded);
    }

    #[tokio::test]
    async fn audit_stamp_creates_then_updates() {
        let mut store = MemoryStore::new();
        let first = store
            .stamp_audit(&"doc-1".into(), &"chw-anna".into(), 100)
            .await
            .expect("stamps");
        assert_eq!(first.first_replicated_at, 100);

        let second = store
            .stamp_audit(&"doc-1".into(), &"chw-ben".into(), 200)
            .await
            .expect("stamps");
        assert_eq!(second.first_replicated_at, 100);
        assert_eq!(second.latest_write_at, 200);
        assert_eq!(second.writer, "chw-ben".into());
        assert_eq!(store.audit_count(), 1);
    }
}
