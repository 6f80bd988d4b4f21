//! Identity Bridge: the "current user" signal from the auth subsystem.
//!
//! Authentication itself is external. The cart only needs to know whether a
//! user is present and when that changes, so the bridge is a `watch` channel
//! of `Option<Identity>` that the engine and the HTTP client both observe.

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, info};

use cartsync_core::UserId;

use crate::engine::CartEngine;
use crate::remote::RemoteCart;
use crate::store::KeyValueStore;

/// An authenticated shopper.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct Identity {
    /// Backend user ID.
    pub user_id: UserId,
    /// Bearer token for the remote cart service.
    pub access_token: SecretString,
}

impl Identity {
    /// Create an identity.
    #[must_use]
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: SecretString::from(access_token.into()),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Publishes identity transitions (login/logout).
#[derive(Debug)]
pub struct IdentityBridge {
    sender: watch::Sender<Option<Identity>>,
}

impl IdentityBridge {
    /// Create a bridge with an initial identity (or none for a guest).
    #[must_use]
    pub fn new(initial: Option<Identity>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Mark a user as logged in.
    pub fn login(&self, identity: Identity) {
        info!(user_id = %identity.user_id, "Identity present");
        self.sender.send_replace(Some(identity));
    }

    /// Mark the user as logged out.
    pub fn logout(&self) {
        info!("Identity absent");
        self.sender.send_replace(None);
    }

    /// The current identity, if any.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    /// Whether a user is currently logged in.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Receiver for identity transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }
}

impl Default for IdentityBridge {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Forward identity transitions to a cart engine until the bridge is dropped.
///
/// Intended to be spawned as a background task next to the engine. The
/// starting identity is read when this is called, so a login published
/// before the task first runs is still delivered.
pub fn watch_identity<R, S>(
    engine: CartEngine<R, S>,
    mut identity: watch::Receiver<Option<Identity>>,
) -> impl Future<Output = ()>
where
    R: RemoteCart + 'static,
    S: KeyValueStore + 'static,
{
    let initial = identity.borrow_and_update().clone();
    forward_identity(engine, identity, initial)
}

async fn forward_identity<R, S>(
    engine: CartEngine<R, S>,
    mut identity: watch::Receiver<Option<Identity>>,
    mut previous: Option<Identity>,
) where
    R: RemoteCart + 'static,
    S: KeyValueStore + 'static,
{
    while identity.changed().await.is_ok() {
        let current = identity.borrow_and_update().clone();
        let outcome = engine
            .handle_identity_change(previous.as_ref(), current.as_ref())
            .await;
        debug!(?outcome, "Handled identity transition");
        previous = current;
    }
    debug!("Identity bridge closed, stopping watcher");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_debug_redacts_token() {
        let identity = Identity::new(UserId::new(3), "super_secret_token");
        let debug_output = format!("{identity:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_token"));
    }

    #[test]
    fn test_bridge_login_logout() {
        let bridge = IdentityBridge::default();
        let receiver = bridge.subscribe();
        assert!(!bridge.is_present());

        bridge.login(Identity::new(UserId::new(1), "token"));
        assert!(bridge.is_present());
        assert_eq!(
            receiver.borrow().as_ref().map(|identity| identity.user_id),
            Some(UserId::new(1))
        );

        bridge.logout();
        assert!(bridge.current().is_none());
        assert!(receiver.borrow().is_none());
    }
}
