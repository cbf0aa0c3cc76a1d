// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces and implementations of persistence layers and external
//! collaborators for the warden gateway.
//!
//! The gateway core never talks to a concrete database or identity backend.
//! It reaches the backing document store, the identity provider, and its own
//! durable state (audit records, purge log) exclusively through the trait
//! seams defined in [`traits`].
//!
//! An in-memory implementation of all seams is provided by [`MemoryStore`]
//! and [`MemoryIdentity`]. It is suitable both as a test fixture and as an
//! ephemeral single-process deployment backend.
pub mod memory;
pub mod traits;

pub use memory::{MemoryIdentity, MemoryStore, MemoryStoreError};
pub use traits::{
    AuditStore, DocumentStore, IdentityProvider, LocalAuditStore, LocalDocumentStore,
    LocalIdentityProvider, LocalPurgeStore, PurgeStore,
};
