// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stream-based response filtering for the warden gateway.
//!
//! The dispatch layer opts into interception per endpoint class: filtered
//! endpoints route their backend response through the adapters in this crate,
//! while always-proxy responses never touch them and keep a zero-buffering
//! pass-through path.
//!
//! [`FilterChangesExt::filter_changes`] rewrites a live change feed against a
//! user's visibility set without reordering or batching. [`filter_bulk_rows`]
//! rewrites a bounded bulk-read response positionally.
mod bulk;
mod filter;

pub use bulk::filter_bulk_rows;
pub use filter::{FilterChanges, FilterChangesExt};
