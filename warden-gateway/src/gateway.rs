// SPDX-License-Identifier: MIT OR Apache-2.0

//! The gateway front object: session → classification → enforcement →
//! dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::{debug, warn};
use warden_core::{
    BulkRow, Checkpoint, DocId, Document, FeedEvent, GatewayError, PurgeEntry, Revision, Seq,
    UserContext, WriteOutcome,
};
use warden_store::{AuditStore, DocumentStore, IdentityProvider, PurgeStore};
use warden_stream::{FilterChangesExt, filter_bulk_rows};

use crate::config::GatewayConfig;
use crate::firewall::{EndpointClass, Method, RouteTable, enforce};
use crate::purge::PurgeFeed;
use crate::session::SessionResolver;
use crate::visibility::VisibilityResolver;
use crate::write::WritePipeline;

/// What a request asks the backing store to do, transport-agnostic.
#[derive(Debug)]
pub enum Operation {
    /// Open the change feed after the given sequence.
    Feed { since: Seq },
    /// Positional bulk read.
    BulkRead { keys: Vec<DocId> },
    /// Bulk write through the audited pipeline.
    Write { docs: Vec<Document> },
    /// Read the purge feed from a client-held checkpoint token.
    Purges { checkpoint: String },
    /// Single-document reads and writes on proxied endpoints.
    GetDoc { id: DocId },
    PutDoc { doc: Document },
    DeleteDoc { id: DocId, revision: Revision },
}

/// One inbound client request.
#[derive(Debug)]
pub struct GatewayRequest {
    pub endpoint: String,
    pub method: Method,
    pub credential: Option<String>,
    pub operation: Operation,
}

/// Response to a dispatched request.
///
/// A `Feed` response owns its upstream subscription: dropping the stream
/// tears the backend connection down, so a client disconnect mid-stream
/// leaves no orphaned long-lived connection behind.
pub enum GatewayResponse {
    Feed(BoxStream<'static, FeedEvent>),
    Rows(Vec<BulkRow>),
    Written(Vec<WriteOutcome>),
    Purges {
        entries: Vec<PurgeEntry>,
        checkpoint: Checkpoint,
    },
    Doc(Option<Document>),
    WriteResult(WriteOutcome),
}

impl std::fmt::Debug for GatewayResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayResponse::Feed(_) => f.write_str("Feed(..)"),
            GatewayResponse::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            GatewayResponse::Written(outcomes) => {
                f.debug_tuple("Written").field(outcomes).finish()
            }
            GatewayResponse::Purges { entries, checkpoint } => f
                .debug_struct("Purges")
                .field("entries", entries)
                .field("checkpoint", checkpoint)
                .finish(),
            GatewayResponse::Doc(doc) => f.debug_tuple("Doc").field(doc).finish(),
            GatewayResponse::WriteResult(outcome) => {
                f.debug_tuple("WriteResult").field(outcome).finish()
            }
        }
    }
}

/// The decision layer in front of the backing store.
pub struct Gateway<S, I>
where
    S: DocumentStore + AuditStore + PurgeStore,
    I: IdentityProvider,
{
    store: S,
    session: SessionResolver<I>,
    table: RouteTable,
    visibility: VisibilityResolver<S>,
    writes: WritePipeline<S>,
    purges: PurgeFeed<S>,
}

impl<S, I> Gateway<S, I>
where
    S: DocumentStore + AuditStore + PurgeStore,
    <S as DocumentStore>::Feed: Send + 'static,
    I: IdentityProvider,
{
    pub fn new(store: S, identity: I, table: RouteTable, config: GatewayConfig) -> Self {
        Self {
            session: SessionResolver::new(identity, config.online_role.clone()),
            visibility: VisibilityResolver::new(store.clone()),
            writes: WritePipeline::new(store.clone(), &config),
            purges: PurgeFeed::new(store.clone()),
            table,
            store,
        }
    }

    /// Invalidate cached visibility for a user (role or facility change
    /// pushed from the identity provider).
    pub fn invalidate_visibility(&self, user: &warden_core::UserId) {
        self.visibility.invalidate(user);
    }

    /// Drive one request through the full decision flow.
    pub async fn handle(
        &mut self,
        request: GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let ctx = self.session.resolve(request.credential.as_deref()).await?;

        let Some(class) = self.table.classify(&request.endpoint, request.method) else {
            // An unmapped endpoint is a configuration defect; fail closed.
            warn!(endpoint = %request.endpoint, "request to unclassified endpoint");
            return Err(GatewayError::Forbidden("unclassified endpoint"));
        };
        debug!(endpoint = %request.endpoint, ?class, user = %ctx.user, "classified request");

        match request.operation {
            Operation::Write { docs } => {
                if class != EndpointClass::WriteAudited {
                    return Err(GatewayError::Forbidden(
                        "bulk writes must pass the audited pipeline",
                    ));
                }
                let visible = self.visibility.visibility_for(&ctx).await;
                let prepared = self.writes.prepare(docs, &ctx, &visible)?;
                enforce(class, &ctx, prepared.authorized)?;
                let outcomes = self.writes.commit(prepared, &ctx).await?;
                Ok(GatewayResponse::Written(outcomes))
            }
            // Single-document writes on audited endpoints take the same
            // pipeline as a one-document batch.
            Operation::PutDoc { doc } if class == EndpointClass::WriteAudited => {
                let visible = self.visibility.visibility_for(&ctx).await;
                let prepared = self.writes.prepare(vec![doc], &ctx, &visible)?;
                enforce(class, &ctx, prepared.authorized)?;
                let outcomes = self.writes.commit(prepared, &ctx).await?;
                let outcome = outcomes
                    .into_iter()
                    .next()
                    .ok_or_else(|| GatewayError::upstream("store returned no write outcome"))?;
                Ok(GatewayResponse::WriteResult(outcome))
            }
            Operation::DeleteDoc { id, revision } if class == EndpointClass::WriteAudited => {
                let visible = self.visibility.visibility_for(&ctx).await;
                let prepared = self.writes.prepare_delete(id, revision, &ctx, &visible)?;
                enforce(class, &ctx, prepared.authorized)?;
                let outcome = self.writes.commit_delete(prepared, &ctx).await?;
                Ok(GatewayResponse::WriteResult(outcome))
            }
            operation => {
                enforce(class, &ctx, false)?;
                self.dispatch(class, operation, &ctx).await
            }
        }
    }

    async fn dispatch(
        &mut self,
        class: EndpointClass,
        operation: Operation,
        ctx: &UserContext,
    ) -> Result<GatewayResponse, GatewayError> {
        match operation {
            Operation::Feed { since } => {
                if class == EndpointClass::Filtered && !ctx.is_online {
                    // Visibility first: the recompute appends any fresh purge
                    // entries the stub rewrite below must know about.
                    let visible = self.visibility.visibility_for(ctx).await;
                    let purged = self.purged_docs(ctx).await?;
                    let upstream = self.open_feed(since).await?;
                    Ok(GatewayResponse::Feed(
                        upstream.filter_changes(visible, Arc::new(purged)).boxed(),
                    ))
                } else {
                    let upstream = self.open_feed(since).await?;
                    Ok(GatewayResponse::Feed(upstream.boxed()))
                }
            }
            Operation::BulkRead { keys } => {
                let rows = self.bulk_read(&keys).await?;
                if class == EndpointClass::Filtered && !ctx.is_online {
                    let visible = self.visibility.visibility_for(ctx).await;
                    Ok(GatewayResponse::Rows(filter_bulk_rows(rows, &visible)))
                } else {
                    Ok(GatewayResponse::Rows(rows))
                }
            }
            Operation::Purges { checkpoint } => {
                // Recompute visibility first so purges caused by a pending
                // hierarchy change are already in the log.
                if !ctx.is_online {
                    let _ = self.visibility.visibility_for(ctx).await;
                }
                let (entries, checkpoint) =
                    self.purges.purges_since(&ctx.user, &checkpoint).await?;
                Ok(GatewayResponse::Purges {
                    entries,
                    checkpoint,
                })
            }
            Operation::GetDoc { id } => {
                let doc = match self.store.get_document(&id).await {
                    Ok(doc) => doc,
                    Err(err) => {
                        warn!(error = %err, doc = %id, "document read failed, retrying once");
                        self.store
                            .get_document(&id)
                            .await
                            .map_err(GatewayError::upstream)?
                    }
                };
                Ok(GatewayResponse::Doc(doc))
            }
            Operation::PutDoc { doc } => {
                // Plain proxy path for non-audited endpoints; writes are
                // never retried.
                let outcome = self
                    .store
                    .put_document(&doc)
                    .await
                    .map_err(GatewayError::upstream)?;
                Ok(GatewayResponse::WriteResult(outcome))
            }
            Operation::DeleteDoc { id, revision } => {
                let outcome = self
                    .store
                    .delete_document(&id, &revision)
                    .await
                    .map_err(GatewayError::upstream)?;
                Ok(GatewayResponse::WriteResult(outcome))
            }
            Operation::Write { .. } => {
                // Handled before dispatch; unreachable through `handle`.
                Err(GatewayError::Forbidden(
                    "bulk writes must pass the audited pipeline",
                ))
            }
        }
    }

    /// Open the upstream change feed, retrying a transient failure once.
    async fn open_feed(
        &self,
        since: Seq,
    ) -> Result<<S as DocumentStore>::Feed, GatewayError> {
        match self.store.change_feed(since).await {
            Ok(feed) => Ok(feed),
            Err(err) => {
                warn!(error = %err, "change feed failed to open, retrying once");
                self.store
                    .change_feed(since)
                    .await
                    .map_err(GatewayError::upstream)
            }
        }
    }

    /// Bulk read with a single transparent retry.
    async fn bulk_read(&self, keys: &[DocId]) -> Result<Vec<BulkRow>, GatewayError> {
        match self.store.bulk_read(keys).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                warn!(error = %err, "bulk read failed, retrying once");
                self.store
                    .bulk_read(keys)
                    .await
                    .map_err(GatewayError::upstream)
            }
        }
    }

    /// Every document this user has ever lost visibility of.
    ///
    /// Feeds the stub rewrite: an event for a purged document becomes a
    /// deletion stub. Stale entries for documents visible again are harmless
    /// because the filter checks visibility first.
    async fn purged_docs(&self, ctx: &UserContext) -> Result<HashSet<DocId>, GatewayError> {
        let entries = self
            .store
            .purges_since(&Checkpoint::start(ctx.user.clone()))
            .await
            .map_err(GatewayError::upstream)?;
        Ok(entries.into_iter().map(|entry| entry.doc).collect())
    }
}
