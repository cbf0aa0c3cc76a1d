// SPDX-License-Identifier: MIT OR Apache-2.0

//! User and facility identity types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Node in the facility hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Role name as issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Claims returned by the identity provider for a validated credential.
///
/// Boundary shape only; the gateway derives a [`UserContext`] from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user: UserId,
    pub roles: BTreeSet<Role>,
    pub facility: FacilityId,
}

/// Per-request user context.
///
/// Created from validated [`SessionClaims`], immutable for the lifetime of the
/// request and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserContext {
    pub user: UserId,
    pub roles: BTreeSet<Role>,
    /// Root of this user's visibility in the facility hierarchy.
    pub facility: FacilityId,
    /// Derived from role membership: an online user sees everything and
    /// bypasses response filtering entirely.
    pub is_online: bool,
}

impl UserContext {
    /// Derive a request context from validated claims.
    pub fn from_claims(claims: SessionClaims, online_role: &Role) -> Self {
        let is_online = claims.roles.contains(online_role);
        Self {
            user: claims.user,
            roles: claims.roles,
            facility: claims.facility,
            is_online,
        }
    }
}
