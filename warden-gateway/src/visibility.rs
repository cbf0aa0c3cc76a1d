// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user visibility computation and caching.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use warden_core::{UserContext, UserId, VisibilitySet};
use warden_store::{DocumentStore, PurgeStore};

#[derive(Clone, Debug)]
struct CachedSet {
    version: u64,
    set: Arc<VisibilitySet>,
}

/// Computes and caches which documents each user may see.
///
/// The cache is the only state shared across concurrent requests for the same
/// user. Entries are keyed by `(user, hierarchy version)` and replaced as a
/// single atomic slot swap, so concurrent readers observe either the old or
/// the new complete set, never a mix.
#[derive(Clone, Debug)]
pub struct VisibilityResolver<S> {
    store: S,
    cache: Arc<RwLock<HashMap<UserId, CachedSet>>>,
}

impl<S> VisibilityResolver<S>
where
    S: DocumentStore + PurgeStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The set of documents this user may currently see.
    ///
    /// Recomputed whenever the hierarchy version moved since the cached
    /// entry. On recompute, every document which fell out of view gets one
    /// purge-log entry. If hierarchy data is unreachable the resolution fails
    /// closed with an empty (and uncached) set rather than granting excess
    /// access.
    pub async fn visibility_for(&mut self, ctx: &UserContext) -> Arc<VisibilitySet> {
        let version = match self.store.hierarchy_version().await {
            Ok(version) => version,
            Err(err) => {
                warn!(error = %err, user = %ctx.user, "hierarchy unreachable, failing closed");
                return Arc::new(VisibilitySet::new());
            }
        };

        let previous = {
            let cache = self.cache.read().expect("acquire read access on cache");
            cache.get(&ctx.user).cloned()
        };
        if let Some(cached) = &previous {
            if cached.version == version {
                return cached.set.clone();
            }
        }

        let set = match self.compute(ctx).await {
            Ok(set) => Arc::new(set),
            Err(err) => {
                warn!(error = %err, user = %ctx.user, "visibility traversal failed, failing closed");
                return Arc::new(VisibilitySet::new());
            }
        };
        debug!(user = %ctx.user, docs = set.len(), version, "computed visibility set");

        // Publish before recording purges. When two requests recompute the
        // same version concurrently, only the one winning the cache slot
        // appends purge entries; the loser adopts the published set.
        let published = {
            let mut cache = self.cache.write().expect("acquire write access on cache");
            match cache.get(&ctx.user) {
                Some(existing) if existing.version >= version => Some(existing.set.clone()),
                _ => {
                    cache.insert(
                        ctx.user.clone(),
                        CachedSet {
                            version,
                            set: set.clone(),
                        },
                    );
                    None
                }
            }
        };
        if let Some(current) = published {
            return current;
        }

        if let Some(cached) = previous {
            for (doc, revision) in cached.set.lost_against(&set) {
                match self.store.append_purge(&ctx.user, doc, revision).await {
                    Ok(seq) => {
                        debug!(user = %ctx.user, doc = %doc, seq = %seq, "document left visibility")
                    }
                    Err(err) => warn!(error = %err, doc = %doc, "failed to record purge"),
                }
            }
        }

        set
    }

    /// Depth-first traversal of the facility hierarchy rooted at the user's
    /// facility, collecting documents owned by every reachable facility plus
    /// the user's independently-owned documents.
    ///
    /// Repeated facility ids are treated as already visited and never
    /// re-descended, so malformed or cyclic hierarchies still terminate.
    async fn compute(
        &self,
        ctx: &UserContext,
    ) -> Result<VisibilitySet, <S as DocumentStore>::Error> {
        let mut set = VisibilitySet::new();
        let mut stack = vec![ctx.facility.clone()];

        while let Some(facility) = stack.pop() {
            if !set.insert_facility(facility.clone()) {
                continue;
            }

            match self.store.children(&facility).await? {
                Some(children) => stack.extend(children),
                None => debug!(facility = %facility, "facility missing from hierarchy"),
            }

            for (doc, revision) in self.store.docs_in_facility(&facility).await? {
                set.insert(doc, revision);
            }
        }

        for (doc, revision) in self.store.docs_owned_by(&ctx.user).await? {
            set.insert(doc, revision);
        }

        Ok(set)
    }

    /// Drop the cached set for one user (role or facility change).
    pub fn invalidate(&self, user: &UserId) {
        self.cache
            .write()
            .expect("acquire write access on cache")
            .remove(user);
    }

    /// Drop every cached set (bulk permission change).
    pub fn invalidate_all(&self) {
        self.cache
            .write()
            .expect("acquire write access on cache")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use warden_core::{
        BulkRow, Checkpoint, DocId, DocOwner, Document, FacilityId, PurgeEntry, Revision, Seq,
        UserContext, UserId, WriteOutcome,
    };
    use warden_store::{DocumentStore, MemoryStore, MemoryStoreError, PurgeStore};

    use super::VisibilityResolver;

    fn ctx(user: &str, facility: &str) -> UserContext {
        UserContext {
            user: user.into(),
            roles: BTreeSet::new(),
            facility: facility.into(),
            is_online: false,
        }
    }

    fn doc(id: &str, owner: DocOwner) -> Document {
        Document::new(
            DocId::from(id),
            Revision::from(""),
            owner,
            serde_json::json!({}),
        )
    }

    fn hierarchy() -> MemoryStore {
        // district ── clinic-1 ── area-1
        //          └─ clinic-2
        let store = MemoryStore::new();
        store.insert_facility("district".into(), None);
        store.insert_facility("clinic-1".into(), Some(&"district".into()));
        store.insert_facility("clinic-2".into(), Some(&"district".into()));
        store.insert_facility("area-1".into(), Some(&"clinic-1".into()));
        store.insert_document(doc("doc-c1", DocOwner::facility("clinic-1".into())));
        store.insert_document(doc("doc-a1", DocOwner::facility("area-1".into())));
        store.insert_document(doc("doc-c2", DocOwner::facility("clinic-2".into())));
        store.insert_document(doc("doc-own", DocOwner::user("chw-anna".into())));
        store
    }

    #[tokio::test]
    async fn membership_is_reachability_plus_self_owned() {
        let store = hierarchy();
        let mut resolver = VisibilityResolver::new(store);

        let set = resolver.visibility_for(&ctx("chw-anna", "clinic-1")).await;

        assert!(set.contains(&"doc-c1".into()));
        assert!(set.contains(&"doc-a1".into()));
        assert!(set.contains(&"doc-own".into()));
        assert!(!set.contains(&"doc-c2".into()));
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn cyclic_hierarchies_terminate() {
        let store = MemoryStore::new();
        store.insert_facility("a".into(), None);
        store.insert_facility("b".into(), Some(&"a".into()));
        // Malformed: b points back up at a.
        store.insert_facility("a".into(), Some(&"b".into()));
        store.insert_document(doc("doc-b", DocOwner::facility("b".into())));

        let mut resolver = VisibilityResolver::new(store);
        let set = resolver.visibility_for(&ctx("chw-anna", "a")).await;
        assert!(set.contains(&"doc-b".into()));
    }

    #[tokio::test]
    async fn unreachable_hierarchy_fails_closed_and_uncached() {
        let store = hierarchy();
        let mut resolver = VisibilityResolver::new(store.clone());

        store.fail_next_reads(1);
        let set = resolver.visibility_for(&ctx("chw-anna", "clinic-1")).await;
        assert!(set.is_empty());

        // The empty set was not cached; the next attempt sees everything.
        let set = resolver.visibility_for(&ctx("chw-anna", "clinic-1")).await;
        assert_eq!(set.len(), 3);
    }

    /// Delegating store which yields to the scheduler on every hierarchy
    /// lookup, letting two in-flight recomputes interleave.
    #[derive(Clone)]
    struct SlowStore {
        inner: MemoryStore,
    }

    impl DocumentStore for SlowStore {
        type Error = MemoryStoreError;
        type Feed = <MemoryStore as DocumentStore>::Feed;

        async fn change_feed(&self, since: Seq) -> Result<Self::Feed, Self::Error> {
            self.inner.change_feed(since).await
        }

        async fn bulk_read(&self, keys: &[DocId]) -> Result<Vec<BulkRow>, Self::Error> {
            self.inner.bulk_read(keys).await
        }

        async fn bulk_write(&mut self, docs: &[Document]) -> Result<Vec<WriteOutcome>, Self::Error> {
            self.inner.bulk_write(docs).await
        }

        async fn get_document(&self, id: &DocId) -> Result<Option<Document>, Self::Error> {
            self.inner.get_document(id).await
        }

        async fn put_document(&mut self, doc: &Document) -> Result<WriteOutcome, Self::Error> {
            self.inner.put_document(doc).await
        }

        async fn delete_document(
            &mut self,
            id: &DocId,
            revision: &Revision,
        ) -> Result<WriteOutcome, Self::Error> {
            self.inner.delete_document(id, revision).await
        }

        async fn children(
            &self,
            facility: &FacilityId,
        ) -> Result<Option<Vec<FacilityId>>, Self::Error> {
            tokio::task::yield_now().await;
            self.inner.children(facility).await
        }

        async fn docs_in_facility(
            &self,
            facility: &FacilityId,
        ) -> Result<Vec<(DocId, Revision)>, Self::Error> {
            self.inner.docs_in_facility(facility).await
        }

        async fn docs_owned_by(
            &self,
            user: &UserId,
        ) -> Result<Vec<(DocId, Revision)>, Self::Error> {
            self.inner.docs_owned_by(user).await
        }

        async fn hierarchy_version(&self) -> Result<u64, Self::Error> {
            self.inner.hierarchy_version().await
        }
    }

    impl PurgeStore for SlowStore {
        type Error = MemoryStoreError;

        async fn append_purge(
            &mut self,
            user: &UserId,
            doc: &DocId,
            revision: &Revision,
        ) -> Result<Seq, Self::Error> {
            self.inner.append_purge(user, doc, revision).await
        }

        async fn purges_since(
            &self,
            checkpoint: &Checkpoint,
        ) -> Result<Vec<PurgeEntry>, Self::Error> {
            self.inner.purges_since(checkpoint).await
        }

        async fn purge_head(&self, user: &UserId) -> Result<Seq, Self::Error> {
            self.inner.purge_head(user).await
        }
    }

    #[tokio::test]
    async fn concurrent_recomputes_append_purges_once() {
        let store = SlowStore { inner: hierarchy() };
        let mut first = VisibilityResolver::new(store.clone());
        let mut second = first.clone();
        let anna = ctx("chw-anna", "clinic-1");

        let _ = first.visibility_for(&anna).await;
        store
            .inner
            .reassign_document(&"doc-c1".into(), "clinic-2".into());

        // Both recomputes run against the same stale cached set; only the
        // one winning the cache slot may record the loss.
        let (a, b) = tokio::join!(first.visibility_for(&anna), second.visibility_for(&anna));
        assert!(!a.contains(&"doc-c1".into()));
        assert_eq!(a, b);

        let purges = store
            .inner
            .purges_since(&Checkpoint::start("chw-anna".into()))
            .await
            .expect("reads purge log");
        assert_eq!(purges.len(), 1);
    }

    #[tokio::test]
    async fn hard_delete_while_visible_records_a_purge_entry() {
        let mut store = hierarchy();
        let mut resolver = VisibilityResolver::new(store.clone());
        let anna = ctx("chw-anna", "clinic-1");

        let set = resolver.visibility_for(&anna).await;
        assert!(set.contains(&"doc-c1".into()));

        let current = store
            .get_document(&"doc-c1".into())
            .await
            .expect("reads")
            .expect("exists");
        store
            .delete_document(&"doc-c1".into(), &current.revision)
            .await
            .expect("deletes");

        let set = resolver.visibility_for(&anna).await;
        assert!(!set.contains(&"doc-c1".into()));

        let purges = store
            .purges_since(&Checkpoint::start("chw-anna".into()))
            .await
            .expect("reads purge log");
        assert_eq!(purges.len(), 1);
        assert_eq!(purges[0].doc, "doc-c1".into());
    }

    #[tokio::test]
    async fn visibility_loss_records_exactly_one_purge_entry() {
        let store = hierarchy();
        let mut resolver = VisibilityResolver::new(store.clone());
        let anna = ctx("chw-anna", "clinic-1");

        let set = resolver.visibility_for(&anna).await;
        assert!(set.contains(&"doc-c1".into()));

        store.reassign_document(&"doc-c1".into(), "clinic-2".into());

        let set = resolver.visibility_for(&anna).await;
        assert!(!set.contains(&"doc-c1".into()));

        let purges = store
            .purges_since(&Checkpoint::start("chw-anna".into()))
            .await
            .expect("reads purge log");
        assert_eq!(purges.len(), 1);
        assert_eq!(purges[0].doc, "doc-c1".into());

        // A further recompute with no change appends nothing.
        resolver.invalidate(&"chw-anna".into());
        let _ = resolver.visibility_for(&anna).await;
        let purges = store
            .purges_since(&Checkpoint::start("chw-anna".into()))
            .await
            .expect("reads purge log");
        assert_eq!(purges.len(), 1);
    }
}
