// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential resolution into per-request user contexts.

use tracing::warn;
use warden_core::{GatewayError, Role, UserContext};
use warden_store::IdentityProvider;

/// Thin wrapper over the external identity provider.
///
/// Turns a request's credential token into a [`UserContext`]. Every rejection
/// maps to [`GatewayError::Unauthenticated`] without distinguishing unknown
/// users from bad tokens, so callers cannot probe for identities.
#[derive(Clone, Debug)]
pub struct SessionResolver<I> {
    identity: I,
    online_role: Role,
}

impl<I> SessionResolver<I>
where
    I: IdentityProvider,
{
    pub fn new(identity: I, online_role: Role) -> Self {
        Self {
            identity,
            online_role,
        }
    }

    /// Resolve a credential into a request-scoped user context.
    ///
    /// On success the credential's expiry is refreshed (sliding session). A
    /// refresh failure is logged and otherwise ignored: the session was
    /// already proven valid.
    pub async fn resolve(&mut self, credential: Option<&str>) -> Result<UserContext, GatewayError> {
        let Some(credential) = credential else {
            return Err(GatewayError::Unauthenticated);
        };

        let claims = match self.identity.validate(credential).await {
            Ok(Some(claims)) => claims,
            Ok(None) => return Err(GatewayError::Unauthenticated),
            Err(err) => return Err(GatewayError::upstream(err)),
        };

        if let Err(err) = self.identity.refresh(credential).await {
            warn!(error = %err, "failed to extend session expiry");
        }

        Ok(UserContext::from_claims(claims, &self.online_role))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use warden_core::{GatewayError, Role, SessionClaims};
    use warden_store::MemoryIdentity;

    use super::SessionResolver;

    fn claims(roles: &[&str]) -> SessionClaims {
        SessionClaims {
            user: "chw-anna".into(),
            roles: roles.iter().map(|r| Role::from(*r)).collect::<BTreeSet<_>>(),
            facility: "clinic-1".into(),
        }
    }

    #[tokio::test]
    async fn valid_credential_yields_context_and_refreshes() {
        let identity = MemoryIdentity::new();
        identity.register("token-anna", claims(&["chw"]));
        let mut resolver = SessionResolver::new(identity.clone(), Role::from("online"));

        let ctx = resolver
            .resolve(Some("token-anna"))
            .await
            .expect("resolves");
        assert_eq!(ctx.user, "chw-anna".into());
        assert!(!ctx.is_online);
        assert_eq!(identity.refresh_count("token-anna"), 1);
    }

    #[tokio::test]
    async fn missing_and_unknown_credentials_are_uniform() {
        let identity = MemoryIdentity::new();
        let mut resolver = SessionResolver::new(identity, Role::from("online"));

        assert!(matches!(
            resolver.resolve(None).await,
            Err(GatewayError::Unauthenticated)
        ));
        assert!(matches!(
            resolver.resolve(Some("no-such-token")).await,
            Err(GatewayError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn provider_outage_is_not_a_401() {
        let identity = MemoryIdentity::new();
        identity.register("token-anna", claims(&["chw"]));
        identity.fail_next(1);
        let mut resolver = SessionResolver::new(identity, Role::from("online"));

        assert!(matches!(
            resolver.resolve(Some("token-anna")).await,
            Err(GatewayError::UpstreamUnavailable(_))
        ));
    }
}
