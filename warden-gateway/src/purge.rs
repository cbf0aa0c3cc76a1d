// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checkpointable purge feed.

use warden_core::{Checkpoint, GatewayError, PurgeEntry, UserId};
use warden_store::PurgeStore;

/// Serves the purge log as an incremental feed so offline replicas can drop
/// documents they lost access to without a full resync.
#[derive(Clone, Debug)]
pub struct PurgeFeed<S> {
    store: S,
}

impl<S> PurgeFeed<S>
where
    S: PurgeStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Entries appended after the client's checkpoint, plus the cursor to
    /// resume from next time.
    ///
    /// Idempotent and monotonic: the same checkpoint always yields the same
    /// entries and next cursor, and replaying from an older checkpoint never
    /// omits an entry visible at that checkpoint. A token which fails to
    /// parse, names another user, or lies beyond the log head (a wiped or
    /// foreign client) yields [`GatewayError::CheckpointInvalid`] so the
    /// caller can branch to full-resync logic instead of assuming it is up
    /// to date.
    pub async fn purges_since(
        &self,
        user: &UserId,
        token: &str,
    ) -> Result<(Vec<PurgeEntry>, Checkpoint), GatewayError> {
        let checkpoint: Checkpoint = token
            .parse()
            .map_err(|_| GatewayError::CheckpointInvalid)?;
        if checkpoint.user != *user {
            return Err(GatewayError::CheckpointInvalid);
        }

        let head = self
            .store
            .purge_head(user)
            .await
            .map_err(GatewayError::upstream)?;
        if checkpoint.seq > head {
            return Err(GatewayError::CheckpointInvalid);
        }

        let entries = self
            .store
            .purges_since(&checkpoint)
            .await
            .map_err(GatewayError::upstream)?;
        let next = Checkpoint {
            user: user.clone(),
            seq: entries.last().map(|entry| entry.seq).unwrap_or(checkpoint.seq),
        };

        Ok((entries, next))
    }
}
