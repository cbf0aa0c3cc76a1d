// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway configuration.

use warden_core::Role;

/// Deployment-level switches of the gateway.
///
/// Stamping and restricting online writers are independent choices.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Role which classifies a user as online. Online users have
    /// unrestricted visibility and bypass response filtering entirely.
    pub online_role: Role,
    /// Stamp audit records for writes by online users too. Defaults to
    /// `true`: audit stamping is provenance, not authorization.
    pub audit_online_writes: bool,
    /// Subject online users to visibility-based write authorization.
    /// Defaults to `false`.
    pub restrict_online_writes: bool,
}

impl GatewayConfig {
    pub fn new(online_role: Role) -> Self {
        Self {
            online_role,
            audit_online_writes: true,
            restrict_online_writes: false,
        }
    }
}
