// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared data types for the warden gateway.
//!
//! `warden-core` holds the vocabulary every other warden crate speaks: document
//! and user identifiers, the change-feed event shape, per-user visibility sets,
//! audit records, the purge log entry and its client-held checkpoint, and the
//! gateway-wide error taxonomy.
//!
//! Nothing in this crate talks to a store or a network. All types are plain
//! values which can be freely cloned, serialized and moved between tasks.
pub mod audit;
pub mod change;
pub mod document;
pub mod error;
pub mod identity;
pub mod purge;
pub mod visibility;

pub use audit::AuditRecord;
pub use change::{ChangeEvent, FeedEvent};
pub use document::{BulkRow, DocId, DocOwner, Document, Revision, Seq, WriteOutcome};
pub use error::GatewayError;
pub use identity::{FacilityId, Role, SessionClaims, UserContext, UserId};
pub use purge::{Checkpoint, CheckpointParseError, PurgeEntry};
pub use visibility::VisibilitySet;
