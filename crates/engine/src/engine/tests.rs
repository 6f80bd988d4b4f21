#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tokio::sync::watch;

use cartsync_core::{Product, ProductId, RemoteLineId, SyncState, UserId};

use super::*;
use crate::cart::CartLine;
use crate::identity::watch_identity;
use crate::remote::SyncFailureReason;
use crate::store::MemoryStore;

// =============================================================================
// Scripted remote
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Fetch,
    Add(ProductId, u32),
    SetQuantity(RemoteLineId, u32),
    Remove(RemoteLineId),
    Clear,
}

/// Fake remote that answers from a queue and records every call.
#[derive(Clone, Default)]
struct ScriptedRemote {
    responses: Arc<Mutex<VecDeque<std::result::Result<CartSnapshot, RemoteError>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedRemote {
    fn push_ok(&self, lines: Vec<CartLine>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(CartSnapshot { lines }));
    }

    fn push_err(&self, err: RemoteError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, call: Call) -> std::result::Result<CartSnapshot, RemoteError> {
        self.calls.lock().unwrap().push(call);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(RemoteError::Status {
                    status: 599,
                    message: "no scripted response".to_string(),
                })
            })
    }
}

impl RemoteCart for ScriptedRemote {
    async fn fetch_cart(&self) -> std::result::Result<CartSnapshot, RemoteError> {
        self.respond(Call::Fetch)
    }

    async fn add_line(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> std::result::Result<CartSnapshot, RemoteError> {
        self.respond(Call::Add(product_id, quantity))
    }

    async fn set_line_quantity(
        &self,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> std::result::Result<CartSnapshot, RemoteError> {
        self.respond(Call::SetQuantity(line_id.clone(), quantity))
    }

    async fn remove_line(
        &self,
        line_id: &RemoteLineId,
    ) -> std::result::Result<CartSnapshot, RemoteError> {
        self.respond(Call::Remove(line_id.clone()))
    }

    async fn clear_cart(&self) -> std::result::Result<CartSnapshot, RemoteError> {
        self.respond(Call::Clear)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

type TestEngine = CartEngine<ScriptedRemote, Arc<MemoryStore>>;

struct Harness {
    engine: TestEngine,
    remote: ScriptedRemote,
    store: Arc<MemoryStore>,
    identity: watch::Sender<Option<Identity>>,
}

fn product(id: i32, price: i64) -> Product {
    Product::new(ProductId::new(id), format!("Product {id}"), Decimal::new(price, 0))
}

fn server_line(id: i32, line_id: &str, quantity: u32, price: i64) -> CartLine {
    CartLine {
        remote_line_id: Some(RemoteLineId::new(line_id)),
        ..CartLine::new(product(id, price), quantity)
    }
}

fn shopper() -> Identity {
    Identity::new(UserId::new(1), "token-1")
}

fn harness(identity: Option<Identity>, options: EngineOptions) -> Harness {
    let remote = ScriptedRemote::default();
    let store = Arc::new(MemoryStore::new());
    let (tx, rx) = watch::channel(identity);
    let engine = CartEngine::new(remote.clone(), Arc::clone(&store), rx, options);
    Harness {
        engine,
        remote,
        store,
        identity: tx,
    }
}

async fn guest() -> Harness {
    let h = harness(None, EngineOptions::default());
    assert_eq!(h.engine.start().await, SyncOutcome::LocalOnly);
    h
}

/// Identified engine whose start-up fetch returned `lines`.
async fn signed_in(lines: Vec<CartLine>) -> Harness {
    let h = harness(Some(shopper()), EngineOptions::default());
    h.remote.push_ok(lines);
    assert_eq!(h.engine.start().await, SyncOutcome::Reconciled);
    h
}

fn persisted_cart(store: &MemoryStore) -> Cart {
    serde_json::from_str(&store.load(CART_STORAGE_KEY).unwrap().unwrap()).unwrap()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_guest_start_is_ready_without_remote_calls() {
    let h = guest().await;

    assert_eq!(h.engine.status(), EngineStatus::Ready);
    assert_eq!(h.engine.sync_state(), SyncState::Unsynced);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_signed_in_start_fetches_remote_cart() {
    let h = signed_in(vec![server_line(3, "30", 2, 5)]).await;

    assert_eq!(h.remote.calls(), vec![Call::Fetch]);
    assert_eq!(h.engine.status(), EngineStatus::Ready);
    assert_eq!(h.engine.sync_state(), SyncState::Synced);
    assert_eq!(h.engine.count(), 2);
    assert!(h.engine.cart().last_synced_at().is_some());
    assert_eq!(persisted_cart(&h.store), h.engine.cart());
}

#[tokio::test]
async fn test_failed_start_fetch_keeps_hydrated_cart() {
    let h = harness(Some(shopper()), EngineOptions::default());
    let stored = Cart::from_lines([CartLine::new(product(1, 10), 3)]);
    h.store
        .save(CART_STORAGE_KEY, &serde_json::to_string(&stored).unwrap())
        .unwrap();
    h.remote.push_err(RemoteError::Status {
        status: 503,
        message: "down".to_string(),
    });

    assert_eq!(h.engine.start().await, SyncOutcome::Diverged);

    // Failed fetch keeps the provisional cart.
    assert_eq!(h.engine.count(), 3);
    assert_eq!(h.engine.sync_state(), SyncState::Diverged);
    assert_eq!(h.engine.status(), EngineStatus::Ready);
}

#[tokio::test]
async fn test_corrupt_local_store_starts_empty() {
    let h = harness(None, EngineOptions::default());
    h.store.save(CART_STORAGE_KEY, "{not json").unwrap();

    h.engine.start().await;

    assert!(h.engine.cart().is_empty());
    assert_eq!(h.engine.status(), EngineStatus::Ready);
}

#[tokio::test]
async fn test_guest_hydration_resets_sync_state() {
    let h = harness(None, EngineOptions::default());
    let mut stored = Cart::from_lines([server_line(1, "10", 1, 10)]);
    stored.set_sync_state(SyncState::Synced);
    h.store
        .save(CART_STORAGE_KEY, &serde_json::to_string(&stored).unwrap())
        .unwrap();

    h.engine.start().await;

    assert_eq!(h.engine.count(), 1);
    assert_eq!(h.engine.sync_state(), SyncState::Unsynced);
}

#[tokio::test]
async fn test_mutations_rejected_before_ready() {
    let h = harness(None, EngineOptions::default());

    let err = h.engine.add(product(1, 10), 1).unwrap_err();
    assert_eq!(err, CartError::NotReady(EngineStatus::Idle));
    assert!(h.engine.cart().is_empty());
    assert!(h.store.load(CART_STORAGE_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_start_twice_refetches() {
    let h = signed_in(Vec::new()).await;
    h.remote.push_ok(vec![server_line(1, "10", 1, 10)]);

    assert_eq!(h.engine.start().await, SyncOutcome::Reconciled);
    assert_eq!(h.remote.calls(), vec![Call::Fetch, Call::Fetch]);
    assert_eq!(h.engine.count(), 1);
}

// =============================================================================
// Validation and local semantics
// =============================================================================

#[tokio::test]
async fn test_add_validation() {
    let h = guest().await;

    assert_eq!(
        h.engine.add(product(1, 10), 0).unwrap_err(),
        CartError::InvalidQuantity(0)
    );
    assert_eq!(
        h.engine.add(product(0, 10), 1).unwrap_err(),
        CartError::MissingProductId
    );
    assert!(h.engine.cart().is_empty());
}

#[tokio::test]
async fn test_add_same_product_twice_merges() {
    let h = guest().await;

    let _ = h.engine.add(product(4, 10), 2).unwrap();
    let _ = h.engine.add(product(4, 10), 3).unwrap();

    let cart = h.engine.cart();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart.line(ProductId::new(4)).unwrap().quantity, 5);
}

#[tokio::test]
async fn test_remove_absent_product_is_noop() {
    let h = guest().await;
    let first = h.engine.add(product(1, 10), 1).unwrap();
    let before = serde_json::to_string(&h.engine.cart()).unwrap();

    let pending = h.engine.remove(ProductId::new(99)).unwrap();

    assert_eq!(serde_json::to_string(&h.engine.cart()).unwrap(), before);
    assert_eq!(pending.seq(), first.seq());
    assert!(pending.remote().is_none());
}

#[tokio::test]
async fn test_set_quantity_zero_equals_remove() {
    let h = guest().await;
    let _ = h.engine.add(product(1, 10), 2).unwrap();
    let _ = h.engine.add(product(2, 10), 1).unwrap();

    let pending = h.engine.set_quantity(ProductId::new(1), 0).unwrap();

    assert_eq!(pending.operation(), CartOperation::Remove);
    assert!(!h.engine.cart().contains(ProductId::new(1)));
    assert!(h.engine.cart().contains(ProductId::new(2)));
}

#[tokio::test]
async fn test_add_set_remove_scenario() {
    let h = guest().await;

    h.engine.add_item(product(7, 10), 2).await.unwrap();
    assert_eq!(h.engine.total(), Decimal::new(20, 0));
    assert_eq!(h.engine.count(), 2);

    h.engine.update_quantity(ProductId::new(7), 5).await.unwrap();
    assert_eq!(h.engine.total(), Decimal::new(50, 0));
    assert_eq!(h.engine.count(), 5);

    h.engine.remove_item(ProductId::new(7)).await.unwrap();
    assert_eq!(h.engine.total(), Decimal::ZERO);
    assert_eq!(h.engine.count(), 0);
    assert!(h.engine.cart().is_empty());
}

#[tokio::test]
async fn test_guest_mutations_make_no_remote_calls() {
    let h = guest().await;

    let outcome = h.engine.add_item(product(1, 10), 1).await.unwrap();
    assert_eq!(outcome, SyncOutcome::LocalOnly);
    h.engine.update_quantity(ProductId::new(1), 4).await.unwrap();
    h.engine.clear_cart().await.unwrap();

    assert!(h.remote.calls().is_empty());
    assert_eq!(h.engine.sync_state(), SyncState::Unsynced);
}

#[tokio::test]
async fn test_optimistic_state_is_published_and_persisted_immediately() {
    let h = guest().await;
    let mut rx = h.engine.subscribe();

    let pending = h.engine.add(product(1, 10), 2).unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().count(), 2);
    assert_eq!(pending.optimistic().count(), 2);
    assert_eq!(persisted_cart(&h.store).count(), 2);
}

#[tokio::test]
async fn test_persistence_failure_is_invisible() {
    let h = guest().await;
    h.store.set_unavailable(true);

    h.engine.add_item(product(1, 10), 1).await.unwrap();

    assert_eq!(h.engine.count(), 1);
}

// =============================================================================
// Remote phase
// =============================================================================

#[tokio::test]
async fn test_remote_failure_keeps_optimistic_state() {
    let h = signed_in(vec![server_line(1, "10", 1, 10)]).await;
    let mut warnings = h.engine.warnings();
    h.remote.push_err(RemoteError::Status {
        status: 503,
        message: "unavailable".to_string(),
    });

    let outcome = h.engine.add_item(product(2, 5), 1).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Diverged);
    let cart = h.engine.cart();
    assert!(cart.contains(ProductId::new(1)));
    assert!(cart.contains(ProductId::new(2)));
    assert_eq!(cart.sync_state(), SyncState::Diverged);
    assert_eq!(persisted_cart(&h.store).sync_state(), SyncState::Diverged);

    let warning = warnings.try_recv().unwrap();
    assert_eq!(warning.operation, CartOperation::Add);
    assert_eq!(warning.product_id, Some(ProductId::new(2)));
    assert_eq!(warning.reason, SyncFailureReason::Server { status: 503 });
}

#[tokio::test]
async fn test_remote_success_replaces_cart_wholesale() {
    let h = signed_in(vec![server_line(1, "10", 1, 10), server_line(2, "20", 1, 10)]).await;
    h.remote.push_ok(vec![server_line(1, "10", 4, 12)]);

    let outcome = h
        .engine
        .update_quantity(ProductId::new(1), 3)
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Reconciled);
    assert_eq!(
        h.remote.calls().last(),
        Some(&Call::SetQuantity(RemoteLineId::new("10"), 3))
    );
    let cart = h.engine.cart();
    assert_eq!(cart.lines(), &[server_line(1, "10", 4, 12)]);
    assert_eq!(cart.sync_state(), SyncState::Synced);
}

#[tokio::test]
async fn test_remove_uses_remote_line_id() {
    let h = signed_in(vec![server_line(5, "abc", 1, 10)]).await;
    h.remote.push_ok(Vec::new());

    h.engine.remove_item(ProductId::new(5)).await.unwrap();

    assert_eq!(
        h.remote.calls().last(),
        Some(&Call::Remove(RemoteLineId::new("abc")))
    );
    assert!(h.engine.cart().is_empty());
}

#[tokio::test]
async fn test_unaddressable_line_marks_diverged_without_remote_call() {
    let h = guest().await;
    let _ = h.engine.add(product(1, 10), 1).unwrap();
    h.identity.send_replace(Some(shopper()));
    let mut warnings = h.engine.warnings();

    let pending = h.engine.set_quantity(ProductId::new(1), 4).unwrap();

    assert!(pending.remote().is_none());
    assert_eq!(h.engine.complete(pending).await, SyncOutcome::LocalOnly);
    assert!(h.remote.calls().is_empty());
    assert_eq!(h.engine.sync_state(), SyncState::Diverged);
    assert!(warnings.try_recv().is_err());
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let h = signed_in(Vec::new()).await;

    let first = h.engine.add(product(1, 10), 1).unwrap();
    let second = h.engine.add(product(2, 10), 1).unwrap();
    assert!(second.seq() > first.seq());

    let stale = h
        .engine
        .resolve(first, Ok(CartSnapshot {
            lines: vec![server_line(1, "10", 1, 10)],
        }))
        .await;
    assert_eq!(stale, SyncOutcome::Stale);
    assert!(h.engine.cart().contains(ProductId::new(2)));

    let latest = h
        .engine
        .resolve(second, Ok(CartSnapshot {
            lines: vec![server_line(1, "10", 1, 10), server_line(2, "20", 1, 10)],
        }))
        .await;
    assert_eq!(latest, SyncOutcome::Reconciled);
    assert_eq!(h.engine.sync_state(), SyncState::Synced);
    assert_eq!(h.engine.cart().len(), 2);
}

#[tokio::test]
async fn test_stale_failure_still_warns_and_keeps_newer_state() {
    let h = signed_in(Vec::new()).await;
    let mut warnings = h.engine.warnings();

    let first = h.engine.add(product(1, 10), 1).unwrap();
    let _second = h.engine.add(product(2, 10), 1).unwrap();

    let outcome = h.engine.resolve(first, Err(RemoteError::Unauthorized)).await;

    assert_eq!(outcome, SyncOutcome::Diverged);
    assert_eq!(h.engine.cart().len(), 2);
    assert_eq!(
        warnings.try_recv().unwrap().reason,
        SyncFailureReason::Unauthorized
    );
}

#[tokio::test]
async fn test_divergence_limit_forces_refetch() {
    let options = EngineOptions {
        divergence_limit: Some(2),
        ..EngineOptions::default()
    };
    let h = harness(Some(shopper()), options);
    h.remote.push_ok(Vec::new());
    h.engine.start().await;

    let first = h.engine.add(product(1, 10), 1).unwrap();
    let outcome = h.engine.resolve(first, Err(RemoteError::NotAuthenticated)).await;
    assert_eq!(outcome, SyncOutcome::Diverged);

    h.remote.push_ok(vec![server_line(9, "90", 1, 3)]);
    let second = h.engine.add(product(2, 10), 1).unwrap();
    let outcome = h.engine.resolve(second, Err(RemoteError::NotAuthenticated)).await;

    assert_eq!(outcome, SyncOutcome::Refetched);
    assert_eq!(h.remote.calls(), vec![Call::Fetch, Call::Fetch]);
    assert_eq!(h.engine.cart().lines(), &[server_line(9, "90", 1, 3)]);
    assert_eq!(h.engine.sync_state(), SyncState::Synced);

    // Counter reset: the next failure does not refetch.
    let third = h.engine.add(product(3, 10), 1).unwrap();
    let outcome = h.engine.resolve(third, Err(RemoteError::NotAuthenticated)).await;
    assert_eq!(outcome, SyncOutcome::Diverged);
    assert_eq!(h.remote.calls().len(), 2);
}

#[tokio::test]
async fn test_divergence_limit_disabled() {
    let options = EngineOptions {
        divergence_limit: None,
        ..EngineOptions::default()
    };
    let h = harness(Some(shopper()), options);
    h.remote.push_ok(Vec::new());
    h.engine.start().await;

    for id in 1..=5 {
        let pending = h.engine.add(product(id, 10), 1).unwrap();
        let outcome = h.engine.resolve(pending, Err(RemoteError::Unauthorized)).await;
        assert_eq!(outcome, SyncOutcome::Diverged);
    }

    assert_eq!(h.remote.calls(), vec![Call::Fetch]);
    assert_eq!(h.engine.cart().len(), 5);
}

#[tokio::test]
async fn test_refresh_failure_warns_with_fetch_operation() {
    let h = signed_in(vec![server_line(1, "10", 2, 10)]).await;
    let mut warnings = h.engine.warnings();
    h.remote.push_err(RemoteError::Status {
        status: 404,
        message: "missing".to_string(),
    });

    assert_eq!(h.engine.refresh().await, SyncOutcome::Diverged);

    let warning = warnings.try_recv().unwrap();
    assert_eq!(warning.operation, CartOperation::Fetch);
    assert_eq!(warning.product_id, None);
    assert_eq!(h.engine.count(), 2);
}

#[tokio::test]
async fn test_clear_sends_clear_request() {
    let h = signed_in(vec![server_line(1, "10", 2, 10)]).await;
    h.remote.push_ok(Vec::new());

    let outcome = h.engine.clear_cart().await.unwrap();

    assert_eq!(outcome, SyncOutcome::Reconciled);
    assert_eq!(h.remote.calls().last(), Some(&Call::Clear));
    assert!(h.engine.cart().is_empty());
}

// =============================================================================
// Identity transitions
// =============================================================================

#[tokio::test]
async fn test_logout_preserves_cart() {
    let h = signed_in(vec![server_line(1, "10", 1, 10), server_line(2, "20", 3, 4)]).await;
    let total = h.engine.total();
    let pending = h.engine.add(product(3, 1), 1).unwrap();

    h.identity.send_replace(None);
    let outcome = h
        .engine
        .handle_identity_change(Some(&shopper()), None)
        .await;

    assert_eq!(outcome, SyncOutcome::LocalOnly);
    assert_eq!(h.engine.cart().len(), 3);
    assert_eq!(h.engine.total(), total + Decimal::ONE);
    assert_eq!(h.engine.sync_state(), SyncState::Unsynced);

    // A response to a request made before logout no longer applies.
    let late = h
        .engine
        .resolve(pending, Ok(CartSnapshot::default()))
        .await;
    assert_eq!(late, SyncOutcome::Stale);
    assert_eq!(h.engine.cart().len(), 3);
}

#[tokio::test]
async fn test_login_fetches_and_replaces_guest_cart() {
    let h = guest().await;
    h.engine.add_item(product(1, 10), 1).await.unwrap();
    h.remote.push_ok(vec![server_line(8, "80", 2, 7)]);

    h.identity.send_replace(Some(shopper()));
    let outcome = h
        .engine
        .handle_identity_change(None, Some(&shopper()))
        .await;

    assert_eq!(outcome, SyncOutcome::Reconciled);
    assert_eq!(h.engine.cart().lines(), &[server_line(8, "80", 2, 7)]);
}

#[tokio::test]
async fn test_same_user_identity_refresh_is_ignored() {
    let h = signed_in(Vec::new()).await;

    let outcome = h
        .engine
        .handle_identity_change(Some(&shopper()), Some(&shopper()))
        .await;

    assert_eq!(outcome, SyncOutcome::LocalOnly);
    assert_eq!(h.remote.calls(), vec![Call::Fetch]);
}

#[tokio::test]
async fn test_failure_from_before_logout_leaves_guest_cart_unsynced() {
    let h = signed_in(Vec::new()).await;
    let mut warnings = h.engine.warnings();
    let pending = h.engine.add(product(2, 10), 1).unwrap();

    h.identity.send_replace(None);
    h.engine
        .handle_identity_change(Some(&shopper()), None)
        .await;
    let late = h
        .engine
        .resolve(pending, Err(RemoteError::Unauthorized))
        .await;

    assert_eq!(late, SyncOutcome::Stale);
    assert_eq!(h.engine.sync_state(), SyncState::Unsynced);
    assert!(warnings.try_recv().is_err());
    assert_eq!(h.engine.inner.consecutive_failures.load(Ordering::SeqCst), 0);

    let outcome = h.engine.add_item(product(3, 10), 1).await.unwrap();
    assert_eq!(outcome, SyncOutcome::LocalOnly);
    assert_eq!(h.engine.sync_state(), SyncState::Unsynced);
    assert_eq!(h.engine.cart().len(), 2);
}

#[tokio::test]
async fn test_user_switch_discards_previous_users_responses() {
    let h = signed_in(vec![server_line(1, "10", 1, 10)]).await;
    let mut warnings = h.engine.warnings();
    let first = h.engine.add(product(2, 10), 1).unwrap();
    let second = h.engine.add(product(3, 10), 1).unwrap();

    let other = Identity::new(UserId::new(2), "token-2");
    h.identity.send_replace(Some(other.clone()));
    h.remote.push_ok(vec![server_line(9, "90", 4, 5)]);
    let outcome = h
        .engine
        .handle_identity_change(Some(&shopper()), Some(&other))
        .await;
    assert_eq!(outcome, SyncOutcome::Reconciled);

    let failed = h
        .engine
        .resolve(first, Err(RemoteError::Unauthorized))
        .await;
    let succeeded = h
        .engine
        .resolve(
            second,
            Ok(CartSnapshot {
                lines: vec![server_line(3, "30", 1, 10)],
            }),
        )
        .await;

    assert_eq!(failed, SyncOutcome::Stale);
    assert_eq!(succeeded, SyncOutcome::Stale);
    assert_eq!(h.engine.cart().lines(), &[server_line(9, "90", 4, 5)]);
    assert_eq!(h.engine.sync_state(), SyncState::Synced);
    assert!(warnings.try_recv().is_err());
}

#[tokio::test]
async fn test_user_switch_during_start_fetch_refetches_for_new_user() {
    let h = harness(Some(shopper()), EngineOptions::default());
    h.engine.set_status(EngineStatus::Fetching);
    let first_user_fetch = h.engine.inner.latest_seq.load(Ordering::SeqCst);

    let other = Identity::new(UserId::new(2), "token-2");
    h.identity.send_replace(Some(other.clone()));
    h.remote.push_ok(vec![server_line(9, "90", 1, 5)]);
    let outcome = h
        .engine
        .handle_identity_change(Some(&shopper()), Some(&other))
        .await;
    assert_eq!(outcome, SyncOutcome::Reconciled);

    // The first user's fetch lands after the switch.
    let late = h.engine.reconcile(
        first_user_fetch,
        CartSnapshot {
            lines: vec![server_line(1, "10", 3, 10)],
        },
    );

    assert_eq!(late, SyncOutcome::Stale);
    assert_eq!(h.engine.cart().lines(), &[server_line(9, "90", 1, 5)]);
}

#[tokio::test]
async fn test_identity_watcher_sees_login_published_before_first_poll() {
    let h = guest().await;
    h.remote.push_ok(vec![server_line(8, "80", 2, 7)]);
    let mut carts = h.engine.subscribe();

    let watcher = watch_identity(h.engine.clone(), h.identity.subscribe());
    h.identity.send_replace(Some(shopper()));
    let task = tokio::spawn(watcher);

    carts
        .wait_for(|cart| cart.sync_state() == SyncState::Synced)
        .await
        .unwrap();
    assert_eq!(h.remote.calls(), vec![Call::Fetch]);
    assert_eq!(h.engine.cart().lines(), &[server_line(8, "80", 2, 7)]);
    task.abort();
}
