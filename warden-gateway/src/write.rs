// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audited write pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use warden_core::{
    DocId, Document, GatewayError, Revision, UserContext, VisibilitySet, WriteOutcome,
};
use warden_store::{AuditStore, DocumentStore};

use crate::config::GatewayConfig;

/// A write batch the pipeline has vetted.
///
/// `authorized` is the flag the routing firewall checks for `WriteAudited`
/// endpoints; the pipeline is the only place that sets it, so a vetted write
/// passes the firewall exactly once.
#[derive(Debug)]
pub struct AuthorizedWrite {
    docs: Vec<Document>,
    pub authorized: bool,
}

impl AuthorizedWrite {
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }
}

/// A single-document delete the pipeline has vetted.
#[derive(Debug)]
pub struct AuthorizedDelete {
    id: DocId,
    revision: Revision,
    pub authorized: bool,
}

/// Intercepts writes, determines authorization, and stamps audit records.
#[derive(Clone, Debug)]
pub struct WritePipeline<S> {
    store: S,
    audit_online_writes: bool,
    restrict_online_writes: bool,
}

impl<S> WritePipeline<S>
where
    S: DocumentStore + AuditStore,
{
    pub fn new(store: S, config: &GatewayConfig) -> Self {
        Self {
            store,
            audit_online_writes: config.audit_online_writes,
            restrict_online_writes: config.restrict_online_writes,
        }
    }

    /// Authorize a write batch against the user's visibility.
    ///
    /// Authorization is per document and all-or-nothing: if any document
    /// fails, the entire batch is rejected and nothing — no store write, no
    /// audit mutation — has happened yet. A document is writable when it is
    /// already within view, or when its owner (facility or user) is covered
    /// by the set, which also admits documents that do not exist yet.
    pub fn prepare(
        &self,
        docs: Vec<Document>,
        ctx: &UserContext,
        visible: &VisibilitySet,
    ) -> Result<AuthorizedWrite, GatewayError> {
        if docs.is_empty() {
            return Err(GatewayError::MalformedPayload("empty write batch".into()));
        }
        if docs.iter().any(|doc| doc.id.as_str().is_empty()) {
            return Err(GatewayError::MalformedPayload(
                "document without an id".into(),
            ));
        }

        let exempt = ctx.is_online && !self.restrict_online_writes;
        if !exempt {
            for doc in &docs {
                let allowed =
                    visible.contains(&doc.id) || visible.covers_owner(&doc.owner, &ctx.user);
                if !allowed {
                    debug!(user = %ctx.user, doc = %doc.id, "write target outside visibility");
                    return Err(GatewayError::Forbidden("document outside visibility"));
                }
            }
        }

        Ok(AuthorizedWrite {
            docs,
            authorized: true,
        })
    }

    /// Authorize a single-document delete against the user's visibility.
    ///
    /// A delete targets an existing document, so it must be within view;
    /// owner coverage for not-yet-existing documents does not apply.
    pub fn prepare_delete(
        &self,
        id: DocId,
        revision: Revision,
        ctx: &UserContext,
        visible: &VisibilitySet,
    ) -> Result<AuthorizedDelete, GatewayError> {
        if id.as_str().is_empty() {
            return Err(GatewayError::MalformedPayload(
                "document without an id".into(),
            ));
        }

        let exempt = ctx.is_online && !self.restrict_online_writes;
        if !exempt && !visible.contains(&id) {
            debug!(user = %ctx.user, doc = %id, "delete target outside visibility");
            return Err(GatewayError::Forbidden("document outside visibility"));
        }

        Ok(AuthorizedDelete {
            id,
            revision,
            authorized: true,
        })
    }

    /// Forward a vetted batch to the store and stamp audit records for the
    /// documents whose write succeeded.
    ///
    /// A store failure surfaces immediately — retrying a write blindly risks
    /// duplication — and leaves the audit table untouched. Per-document
    /// conflicts pass through for the caller to retry.
    pub async fn commit(
        &mut self,
        write: AuthorizedWrite,
        ctx: &UserContext,
    ) -> Result<Vec<WriteOutcome>, GatewayError> {
        let outcomes = self
            .store
            .bulk_write(&write.docs)
            .await
            .map_err(GatewayError::upstream)?;

        if self.audit_online_writes || !ctx.is_online {
            let at = unix_now();
            for outcome in &outcomes {
                if let WriteOutcome::Ok { id, .. } = outcome {
                    self.stamp(id, ctx, at).await;
                }
            }
        }

        Ok(outcomes)
    }

    /// Forward a vetted delete to the store and stamp the audit record if
    /// the tombstone landed.
    pub async fn commit_delete(
        &mut self,
        delete: AuthorizedDelete,
        ctx: &UserContext,
    ) -> Result<WriteOutcome, GatewayError> {
        let outcome = self
            .store
            .delete_document(&delete.id, &delete.revision)
            .await
            .map_err(GatewayError::upstream)?;

        if outcome.is_ok() && (self.audit_online_writes || !ctx.is_online) {
            self.stamp(&delete.id, ctx, unix_now()).await;
        }

        Ok(outcome)
    }

    /// Best-effort audit stamp. The data write has already committed, so a
    /// failed stamp is logged rather than turned into a client-visible
    /// error for a write that succeeded.
    async fn stamp(&mut self, id: &DocId, ctx: &UserContext, at: u64) {
        if let Err(err) = self.store.stamp_audit(id, &ctx.user, at).await {
            warn!(error = %err, doc = %id, "failed to stamp audit record");
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use warden_core::{
        DocId, DocOwner, Document, GatewayError, Revision, Role, UserContext, VisibilitySet,
    };
    use warden_store::MemoryStore;

    use crate::config::GatewayConfig;

    use super::WritePipeline;

    fn offline_ctx() -> UserContext {
        UserContext {
            user: "chw-anna".into(),
            roles: BTreeSet::new(),
            facility: "clinic-1".into(),
            is_online: false,
        }
    }

    fn online_ctx() -> UserContext {
        UserContext {
            is_online: true,
            ..offline_ctx()
        }
    }

    fn doc(id: &str, facility: &str) -> Document {
        Document::new(
            DocId::from(id),
            Revision::from(""),
            DocOwner::facility(facility.into()),
            serde_json::json!({}),
        )
    }

    fn pipeline(store: MemoryStore) -> WritePipeline<MemoryStore> {
        WritePipeline::new(store, &GatewayConfig::new(Role::from("online")))
    }

    fn clinic_view() -> VisibilitySet {
        let mut set = VisibilitySet::new();
        set.insert_facility("clinic-1".into());
        set
    }

    #[tokio::test]
    async fn offline_write_outside_visibility_is_rejected_without_audit() {
        let store = MemoryStore::new();
        let pipeline = pipeline(store.clone());

        let result = pipeline.prepare(
            vec![doc("doc-far", "clinic-2")],
            &offline_ctx(),
            &clinic_view(),
        );
        assert!(matches!(result, Err(GatewayError::Forbidden(_))));
        assert_eq!(store.audit_count(), 0);
    }

    #[tokio::test]
    async fn online_write_succeeds_and_is_stamped() {
        let store = MemoryStore::new();
        let mut pipeline = pipeline(store.clone());
        let ctx = online_ctx();

        let prepared = pipeline
            .prepare(vec![doc("doc-far", "clinic-2")], &ctx, &VisibilitySet::new())
            .expect("online writes are exempt");
        assert!(prepared.authorized);

        let outcomes = pipeline.commit(prepared, &ctx).await.expect("commits");
        assert!(outcomes[0].is_ok());
        assert_eq!(store.audit_count(), 1);
    }

    #[tokio::test]
    async fn one_bad_document_rejects_the_whole_batch() {
        let store = MemoryStore::new();
        let mut batch: Vec<Document> = (0..4)
            .map(|n| doc(&format!("doc-{n}"), "clinic-1"))
            .collect();
        batch.push(doc("doc-4", "clinic-2"));

        let pipeline = pipeline(store.clone());
        let result = pipeline.prepare(batch, &offline_ctx(), &clinic_view());

        assert!(matches!(result, Err(GatewayError::Forbidden(_))));
        // No partial audit state for the four valid documents.
        assert_eq!(store.audit_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_without_audit_mutation() {
        let store = MemoryStore::new();
        let mut pipeline = pipeline(store.clone());
        let ctx = offline_ctx();

        let prepared = pipeline
            .prepare(vec![doc("doc-1", "clinic-1")], &ctx, &clinic_view())
            .expect("authorized");

        store.fail_next_writes(1);
        let result = pipeline.commit(prepared, &ctx).await;
        assert!(matches!(result, Err(GatewayError::UpstreamUnavailable(_))));
        assert_eq!(store.audit_count(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_malformed() {
        let pipeline = pipeline(MemoryStore::new());
        let result = pipeline.prepare(vec![], &offline_ctx(), &clinic_view());
        assert!(matches!(result, Err(GatewayError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn restricted_online_writers_face_visibility_checks() {
        let mut config = GatewayConfig::new(Role::from("online"));
        config.restrict_online_writes = true;
        let pipeline = WritePipeline::new(MemoryStore::new(), &config);
        let ctx = online_ctx();

        let result = pipeline.prepare(vec![doc("doc-far", "clinic-2")], &ctx, &clinic_view());
        assert!(matches!(result, Err(GatewayError::Forbidden(_))));

        let prepared = pipeline
            .prepare(vec![doc("doc-near", "clinic-1")], &ctx, &clinic_view())
            .expect("writes within view pass");
        assert!(prepared.authorized);
    }

    #[tokio::test]
    async fn deletes_require_the_document_in_view() {
        let store = MemoryStore::new();
        let rev = store.insert_document(doc("doc-1", "clinic-2"));
        let pipeline = pipeline(store);

        let result =
            pipeline.prepare_delete("doc-1".into(), rev.clone(), &offline_ctx(), &clinic_view());
        assert!(matches!(result, Err(GatewayError::Forbidden(_))));

        let mut in_view = clinic_view();
        in_view.insert("doc-1".into(), rev.clone());
        let prepared = pipeline
            .prepare_delete("doc-1".into(), rev, &offline_ctx(), &in_view)
            .expect("visible documents may be deleted");
        assert!(prepared.authorized);
    }

    #[tokio::test]
    async fn failed_audit_stamps_do_not_fail_committed_writes() {
        let store = MemoryStore::new();
        let mut pipeline = pipeline(store.clone());
        let ctx = offline_ctx();

        let prepared = pipeline
            .prepare(vec![doc("doc-1", "clinic-1")], &ctx, &clinic_view())
            .expect("authorized");

        store.fail_next_audits(1);
        let outcomes = pipeline.commit(prepared, &ctx).await.expect("commits");
        assert!(outcomes[0].is_ok());
        // The data write stands even though no record was stamped.
        assert_eq!(store.audit_count(), 0);
    }
}
