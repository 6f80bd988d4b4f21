//! Cart Synchronization Engine.
//!
//! Owns the in-memory cart, applies optimistic mutations, reconciles with the
//! remote cart service, and publishes state and warnings to observers.
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Hydrating → Fetching → Ready   (identity present at start)
//! Idle → Hydrating → Ready              (guest)
//! ```
//!
//! Mutations are accepted only in `Ready`. The hydrated local cart is
//! published before the remote fetch starts, so observers never wait on the
//! network to see the shopper's cart.
//!
//! # Mutation protocol
//!
//! Every mutation is two-phase:
//! 1. Optimistic: validated, applied in memory, persisted, and published
//!    synchronously. Returns a [`PendingMutation`].
//! 2. Remote: only when identified. Success replaces the cart with the server
//!    snapshot; failure keeps the optimistic cart, marks it `Diverged`, and
//!    emits a [`SyncWarning`].
//!
//! Each optimistic apply takes a monotonic sequence number. A server snapshot
//! is applied only if no newer optimistic state exists; older responses are
//! discarded as stale.

mod mutation;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use cartsync_core::{Product, ProductId, SyncState};

use crate::cart::Cart;
use crate::config::CartSyncConfig;
use crate::error::{CartError, Result};
use crate::identity::Identity;
use crate::remote::{CartSnapshot, RemoteCart, RemoteError};
use crate::store::{KeyValueStore, Persisted};

pub use mutation::{CartOperation, PendingMutation, RemoteRequest, SyncOutcome, SyncWarning};

/// Default storage key for the cart.
pub const CART_STORAGE_KEY: &str = "cart";

/// Default number of consecutive remote failures before a forced re-fetch.
pub const DEFAULT_DIVERGENCE_LIMIT: u32 = 3;

/// Default buffer size of the warning stream.
pub const DEFAULT_WARNING_CAPACITY: usize = 64;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineStatus {
    #[default]
    Idle,
    Hydrating,
    Fetching,
    Ready,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Hydrating => write!(f, "hydrating"),
            Self::Fetching => write!(f, "fetching"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Tunables for a [`CartEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Local Store key for the cart.
    pub storage_key: String,
    /// Consecutive remote failures that force a hard re-fetch (`None` never).
    pub divergence_limit: Option<u32>,
    /// Buffered warnings per subscriber before the oldest are dropped.
    pub warning_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            storage_key: CART_STORAGE_KEY.to_string(),
            divergence_limit: Some(DEFAULT_DIVERGENCE_LIMIT),
            warning_capacity: DEFAULT_WARNING_CAPACITY,
        }
    }
}

impl From<&CartSyncConfig> for EngineOptions {
    fn from(config: &CartSyncConfig) -> Self {
        Self {
            storage_key: CART_STORAGE_KEY.to_string(),
            divergence_limit: config.divergence_limit,
            warning_capacity: config.warning_capacity,
        }
    }
}

// =============================================================================
// CartEngine
// =============================================================================

/// The single owner of a shopper's cart.
///
/// Cheaply cloneable; clones share the same state. Pass it explicitly to
/// whatever needs the cart.
pub struct CartEngine<R, S> {
    inner: Arc<EngineInner<R, S>>,
}

impl<R, S> Clone for CartEngine<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<R, S> {
    remote: R,
    store: Persisted<Cart, S>,
    identity: watch::Receiver<Option<Identity>>,
    cart: watch::Sender<Cart>,
    status: watch::Sender<EngineStatus>,
    warnings: broadcast::Sender<SyncWarning>,
    /// Sequence number of the newest optimistic state. Only written while the
    /// cart channel is locked by `send_modify`/`send_if_modified`.
    latest_seq: AtomicU64,
    /// `latest_seq` as of the last identity change. Requests issued before it
    /// belong to a previous session.
    identity_epoch: AtomicU64,
    /// Remote failures since the last reconciliation.
    consecutive_failures: AtomicU32,
    divergence_limit: Option<u32>,
}

impl<R, S> CartEngine<R, S>
where
    R: RemoteCart,
    S: KeyValueStore,
{
    /// Create an engine in the `Idle` state with an empty cart.
    ///
    /// Call [`Self::start`] to hydrate from the Local Store.
    pub fn new(
        remote: R,
        store: S,
        identity: watch::Receiver<Option<Identity>>,
        options: EngineOptions,
    ) -> Self {
        let (cart, _) = watch::channel(Cart::default());
        let (status, _) = watch::channel(EngineStatus::Idle);
        let (warnings, _) = broadcast::channel(options.warning_capacity.max(1));

        Self {
            inner: Arc::new(EngineInner {
                remote,
                store: Persisted::new(store, options.storage_key),
                identity,
                cart,
                status,
                warnings,
                latest_seq: AtomicU64::new(0),
                identity_epoch: AtomicU64::new(0),
                consecutive_failures: AtomicU32::new(0),
                divergence_limit: options.divergence_limit,
            }),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Snapshot of the current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.inner.cart.borrow().clone()
    }

    /// Receiver notified on every cart change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.inner.cart.subscribe()
    }

    /// Receiver for remote-phase failure warnings.
    #[must_use]
    pub fn warnings(&self) -> broadcast::Receiver<SyncWarning> {
        self.inner.warnings.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified on lifecycle changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status.subscribe()
    }

    /// Sum of unit price times quantity, computed from the current cart.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.inner.cart.borrow().total()
    }

    /// Sum of quantities, computed from the current cart.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inner.cart.borrow().count()
    }

    /// Current sync state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.inner.cart.borrow().sync_state()
    }

    /// Whether a user is currently identified.
    #[must_use]
    pub fn is_identified(&self) -> bool {
        self.inner.identity.borrow().is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Hydrate from the Local Store, then fetch the remote cart if identified.
    ///
    /// The hydrated cart is published before the fetch begins. Calling this
    /// again on a started engine re-fetches instead.
    #[instrument(skip(self))]
    pub async fn start(&self) -> SyncOutcome {
        if self.status() != EngineStatus::Idle {
            return self.refresh().await;
        }

        self.set_status(EngineStatus::Hydrating);
        let mut cart = self.inner.store.load().normalized();
        let identified = self.is_identified();
        if !identified {
            cart.set_sync_state(SyncState::Unsynced);
        }
        info!(
            lines = cart.len(),
            sync_state = %cart.sync_state(),
            "Hydrated cart from local store"
        );
        self.inner.cart.send_replace(cart);

        if !identified {
            self.set_status(EngineStatus::Ready);
            return SyncOutcome::LocalOnly;
        }

        self.set_status(EngineStatus::Fetching);
        let outcome = self.refresh().await;
        self.set_status(EngineStatus::Ready);
        outcome
    }

    /// Fetch the remote cart and replace local state with it.
    ///
    /// On failure the local cart is kept, marked `Diverged`, and a warning is
    /// emitted. There is no automatic retry; call this again to retry.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> SyncOutcome {
        if !self.is_identified() {
            return SyncOutcome::LocalOnly;
        }

        let seq = self.inner.latest_seq.load(Ordering::SeqCst);
        match self.inner.remote.fetch_cart().await {
            Ok(snapshot) => self.reconcile(seq, snapshot),
            Err(err) if self.predates_identity(seq) => {
                debug!(seq, error = %err, "Ignoring fetch failure from a previous session");
                SyncOutcome::Stale
            }
            Err(err) => {
                self.diverge(CartOperation::Fetch, None, seq, &err);
                SyncOutcome::Diverged
            }
        }
    }

    /// React to an identity transition.
    ///
    /// Login (or a switch to another user) fetches the remote cart. Logout
    /// keeps every line: a guest carries the cart over. Either way, responses
    /// and failures of requests issued before the change are discarded.
    #[instrument(skip(self, previous, current))]
    pub async fn handle_identity_change(
        &self,
        previous: Option<&Identity>,
        current: Option<&Identity>,
    ) -> SyncOutcome {
        match (previous, current) {
            (Some(_), None) => {
                self.begin_session(true);
                self.persist();
                info!(lines = self.cart().len(), "Logged out, keeping local cart");
                SyncOutcome::LocalOnly
            }
            (_, Some(current)) => {
                if previous.map(|p| p.user_id) == Some(current.user_id) {
                    return SyncOutcome::LocalOnly;
                }
                match self.status() {
                    EngineStatus::Ready | EngineStatus::Fetching => {
                        self.begin_session(false);
                        info!(user_id = %current.user_id, "Identity changed, fetching remote cart");
                        self.refresh().await
                    }
                    // `start` has not read the identity yet.
                    EngineStatus::Idle | EngineStatus::Hydrating => SyncOutcome::LocalOnly,
                }
            }
            (None, None) => SyncOutcome::LocalOnly,
        }
    }

    // =========================================================================
    // Mutations: optimistic phase
    // =========================================================================

    /// Add `quantity` units of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns `MissingProductId` or `InvalidQuantity` for bad input and
    /// `NotReady` before hydration completes. No state changes on error.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn add(&self, product: Product, quantity: u32) -> Result<PendingMutation> {
        if !product.id.is_assigned() {
            return Err(CartError::MissingProductId);
        }
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.ensure_ready()?;

        let product_id = product.id;
        Ok(self.commit(CartOperation::Add, Some(product_id), |cart| {
            cart.add_product(product, quantity);
            Some(Some(RemoteRequest::AddLine {
                product_id,
                quantity,
            }))
        }))
    }

    /// Set a line's quantity. Zero behaves exactly like [`Self::remove`].
    ///
    /// A product that is not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MissingProductId` for bad input and `NotReady` before
    /// hydration completes. No state changes on error.
    #[instrument(skip(self))]
    pub fn set_quantity(&self, product_id: ProductId, quantity: u32) -> Result<PendingMutation> {
        if quantity == 0 {
            return self.remove(product_id);
        }
        if !product_id.is_assigned() {
            return Err(CartError::MissingProductId);
        }
        self.ensure_ready()?;

        Ok(self.commit(CartOperation::SetQuantity, Some(product_id), |cart| {
            let line_id = cart.set_quantity(product_id, quantity)?;
            Some(line_id.map(|line_id| RemoteRequest::SetLineQuantity { line_id, quantity }))
        }))
    }

    /// Remove a product's line. A product that is not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MissingProductId` for bad input and `NotReady` before
    /// hydration completes. No state changes on error.
    #[instrument(skip(self))]
    pub fn remove(&self, product_id: ProductId) -> Result<PendingMutation> {
        if !product_id.is_assigned() {
            return Err(CartError::MissingProductId);
        }
        self.ensure_ready()?;

        Ok(self.commit(CartOperation::Remove, Some(product_id), |cart| {
            let line = cart.remove(product_id)?;
            Some(
                line.remote_line_id
                    .map(|line_id| RemoteRequest::RemoveLine { line_id }),
            )
        }))
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `NotReady` before hydration completes.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<PendingMutation> {
        self.ensure_ready()?;

        Ok(self.commit(CartOperation::Clear, None, |cart| {
            cart.clear();
            Some(Some(RemoteRequest::Clear))
        }))
    }

    // =========================================================================
    // Mutations: both phases
    // =========================================================================

    /// [`Self::add`] followed by [`Self::complete`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::add`]; remote failures are reported as warnings.
    pub async fn add_item(&self, product: Product, quantity: u32) -> Result<SyncOutcome> {
        let pending = self.add(product, quantity)?;
        Ok(self.complete(pending).await)
    }

    /// [`Self::set_quantity`] followed by [`Self::complete`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_quantity`]; remote failures are reported as warnings.
    pub async fn update_quantity(&self, product_id: ProductId, quantity: u32) -> Result<SyncOutcome> {
        let pending = self.set_quantity(product_id, quantity)?;
        Ok(self.complete(pending).await)
    }

    /// [`Self::remove`] followed by [`Self::complete`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::remove`]; remote failures are reported as warnings.
    pub async fn remove_item(&self, product_id: ProductId) -> Result<SyncOutcome> {
        let pending = self.remove(product_id)?;
        Ok(self.complete(pending).await)
    }

    /// [`Self::clear`] followed by [`Self::complete`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::clear`]; remote failures are reported as warnings.
    pub async fn clear_cart(&self) -> Result<SyncOutcome> {
        let pending = self.clear()?;
        Ok(self.complete(pending).await)
    }

    // =========================================================================
    // Mutations: remote phase
    // =========================================================================

    /// Run a mutation's remote phase and reconcile.
    #[instrument(skip(self, pending), fields(seq = pending.seq, operation = %pending.operation))]
    pub async fn complete(&self, pending: PendingMutation) -> SyncOutcome {
        let Some(request) = pending.remote.as_ref() else {
            return SyncOutcome::LocalOnly;
        };
        let outcome = self.send(request).await;
        self.resolve(pending, outcome).await
    }

    /// Settle a mutation's remote phase with a known outcome.
    ///
    /// [`Self::complete`] calls this with the real remote response; tests and
    /// callers that perform the remote call themselves can call it directly.
    pub async fn resolve(
        &self,
        pending: PendingMutation,
        outcome: std::result::Result<CartSnapshot, RemoteError>,
    ) -> SyncOutcome {
        if pending.remote.is_none() {
            return SyncOutcome::LocalOnly;
        }

        match outcome {
            Ok(snapshot) => self.reconcile(pending.seq, snapshot),
            Err(err) if self.predates_identity(pending.seq) => {
                debug!(
                    seq = pending.seq,
                    operation = %pending.operation,
                    error = %err,
                    "Ignoring remote failure from a previous session"
                );
                SyncOutcome::Stale
            }
            Err(err) => {
                self.diverge(pending.operation, pending.product_id, pending.seq, &err);

                let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                let Some(limit) = self.inner.divergence_limit else {
                    return SyncOutcome::Diverged;
                };
                if failures < limit {
                    return SyncOutcome::Diverged;
                }

                warn!(failures, limit, "Divergence limit reached, forcing re-fetch");
                match self.refresh().await {
                    SyncOutcome::Reconciled => SyncOutcome::Refetched,
                    _ => SyncOutcome::Diverged,
                }
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_ready(&self) -> Result<()> {
        match self.status() {
            EngineStatus::Ready => Ok(()),
            status => Err(CartError::NotReady(status)),
        }
    }

    fn set_status(&self, status: EngineStatus) {
        debug!(%status, "Engine status");
        self.inner.status.send_replace(status);
    }

    /// Start a new identity session: everything issued so far goes stale.
    fn begin_session(&self, unsynced: bool) {
        self.inner.cart.send_if_modified(|cart| {
            let epoch = self.inner.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.identity_epoch.store(epoch, Ordering::SeqCst);
            if unsynced && cart.sync_state() != SyncState::Unsynced {
                cart.set_sync_state(SyncState::Unsynced);
                return true;
            }
            false
        });
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn predates_identity(&self, seq: u64) -> bool {
        seq < self.inner.identity_epoch.load(Ordering::SeqCst)
    }

    fn persist(&self) {
        let cart = self.cart();
        self.inner.store.save(&cart);
    }

    /// Apply an optimistic change.
    ///
    /// `mutate` returns `None` when nothing changed, otherwise the remote
    /// request that would carry the change (or `None` inside if the affected
    /// line has no server ID to address).
    fn commit<F>(
        &self,
        operation: CartOperation,
        product_id: Option<ProductId>,
        mutate: F,
    ) -> PendingMutation
    where
        F: FnOnce(&mut Cart) -> Option<Option<RemoteRequest>>,
    {
        let identified = self.is_identified();
        let mut remote = None;
        let mut changed = false;
        let mut seq = 0;
        let mut optimistic = Cart::default();

        self.inner.cart.send_if_modified(|cart| {
            let Some(request) = mutate(cart) else {
                seq = self.inner.latest_seq.load(Ordering::SeqCst);
                optimistic = cart.clone();
                return false;
            };

            if identified {
                match request {
                    Some(request) => remote = Some(request),
                    // The server cannot be told; the next fetch will reconverge.
                    None => cart.set_sync_state(SyncState::Diverged),
                }
            }
            seq = self.inner.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
            optimistic = cart.clone();
            changed = true;
            true
        });

        if changed {
            self.inner.store.save(&optimistic);
            debug!(
                seq,
                %operation,
                total = %optimistic.total(),
                count = optimistic.count(),
                remote = remote.is_some(),
                "Applied optimistic mutation"
            );
        } else {
            debug!(%operation, ?product_id, "Mutation had no effect");
        }

        PendingMutation {
            seq,
            operation,
            product_id,
            optimistic,
            remote,
        }
    }

    async fn send(
        &self,
        request: &RemoteRequest,
    ) -> std::result::Result<CartSnapshot, RemoteError> {
        let remote = &self.inner.remote;
        match request {
            RemoteRequest::AddLine {
                product_id,
                quantity,
            } => remote.add_line(*product_id, *quantity).await,
            RemoteRequest::SetLineQuantity { line_id, quantity } => {
                remote.set_line_quantity(line_id, *quantity).await
            }
            RemoteRequest::RemoveLine { line_id } => remote.remove_line(line_id).await,
            RemoteRequest::Clear => remote.clear_cart().await,
        }
    }

    /// Replace the cart with a server snapshot unless a newer optimistic
    /// state exists.
    fn reconcile(&self, seq: u64, snapshot: CartSnapshot) -> SyncOutcome {
        let applied = self.inner.cart.send_if_modified(|cart| {
            if self.inner.latest_seq.load(Ordering::SeqCst) != seq {
                return false;
            }
            cart.reconcile(snapshot, Utc::now());
            true
        });

        if !applied {
            debug!(seq, "Discarding stale remote response");
            return SyncOutcome::Stale;
        }

        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
        self.persist();
        debug!(seq, lines = self.cart().len(), "Reconciled with remote cart");
        SyncOutcome::Reconciled
    }

    /// Keep local state, mark it diverged, and warn observers.
    fn diverge(
        &self,
        operation: CartOperation,
        product_id: Option<ProductId>,
        seq: u64,
        err: &RemoteError,
    ) {
        let reason = err.reason();
        warn!(
            %operation,
            ?product_id,
            seq,
            reason = reason.code(),
            error = %err,
            "Remote sync failed, keeping local cart"
        );

        let changed = self.inner.cart.send_if_modified(|cart| {
            if cart.sync_state() == SyncState::Diverged {
                return false;
            }
            cart.set_sync_state(SyncState::Diverged);
            true
        });
        if changed {
            self.persist();
        }

        // No subscribers is fine; warnings are advisory.
        let _ = self.inner.warnings.send(SyncWarning {
            operation,
            product_id,
            reason,
            message: err.to_string(),
            seq,
            occurred_at: Utc::now(),
        });
    }
}
