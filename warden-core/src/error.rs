// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway-wide error taxonomy.

use thiserror::Error;

/// Every failure the gateway surfaces to a client maps onto one of these
/// variants.
///
/// Authorization decisions are definitive for a request and never retried.
/// `CheckpointInvalid` is deliberately distinct from a generic error so the
/// client can branch into full-resync logic.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No or invalid credential. Uniform for unknown users and bad tokens so
    /// callers cannot probe for identities. 401-equivalent.
    #[error("request is not authenticated")]
    Unauthenticated,

    /// Denied by the routing firewall or by write authorization.
    /// 403-equivalent.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The supplied purge cursor is unrecognized; the client must fall back
    /// to a full resync.
    #[error("purge checkpoint not recognised")]
    CheckpointInvalid,

    /// Backing store or identity provider unreachable. 502/504-equivalent.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Request body failed structural validation before reaching the store.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl GatewayError {
    /// Wrap an upstream failure, keeping only its display form.
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}
