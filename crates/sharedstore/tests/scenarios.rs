//! End-to-end scenarios across registries, backends and the in-process hub.
//!
//! Each "context" is its own `Registry`; contexts that share a `MemoryHub`
//! see each other's broadcasts, contexts that share a backend see each
//! other's persisted values.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use sharedstore::broadcast::MemoryHub;
use sharedstore::persist::{
    Blocking, MemoryPersistence, PersistError, SqlitePersistence, SyncPersistence,
};
use sharedstore::{Registry, RegistryConfig, StoreError, StoreOptions};
use sharedstore_testkit::{GatedPersistence, Probe, WriteOutcome};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn context(hub: &MemoryHub) -> Registry {
    Registry::default().with_broadcaster(Arc::new(hub.clone()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Form {
    name: String,
    age: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry semantics
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_counter_shared_between_call_sites() {
    init_tracing();
    let registry = Registry::default();
    let probe = Probe::new();

    let counter = registry.get_or_create("counter", 1, StoreOptions::new()).unwrap();
    assert_eq!(counter.get(), 1);
    counter.subscribe(probe.callback());

    counter.set_state(2);
    assert_eq!(probe.seen(), vec![2]);

    let elsewhere = registry.get_or_create("counter", 99, StoreOptions::new()).unwrap();
    assert_eq!(elsewhere.get(), 2);
    assert_eq!(probe.seen(), vec![2]);
}

#[test]
fn test_empty_namespace_rejected() {
    let registry = Registry::default();
    let err = registry.get_or_create("", 1, StoreOptions::new()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidNamespace { .. }));
    assert!(registry.is_empty());

    assert!(matches!(
        registry.set_value("", 1),
        Err(StoreError::InvalidNamespace { .. })
    ));
}

#[test]
fn test_independent_subscribers_agree() {
    let registry = Registry::default();
    let a = Probe::new();
    let b = Probe::new();

    registry
        .get_or_create("shared", 0, StoreOptions::new())
        .unwrap()
        .subscribe(a.callback());
    registry
        .get_or_create("shared", 0, StoreOptions::new())
        .unwrap()
        .subscribe(b.callback());

    for v in [3, 1, 4, 1, 5] {
        registry.set_value("shared", v).unwrap();
        assert_eq!(a.last(), b.last());
    }
    assert_eq!(a.seen(), vec![3, 1, 4, 1, 5]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_form_written_through_under_prefixed_key() {
    init_tracing();
    let backend = Arc::new(MemoryPersistence::new());
    let registry = Registry::default().with_sync_persistence(backend.clone());

    let form = registry.get_or_create("form", 1, StoreOptions::persisted()).unwrap();
    assert_eq!(form.get(), 1);
    assert!(backend.is_empty());

    form.set_state(5);
    assert_eq!(backend.keys(), vec!["!store::form"]);
    assert_eq!(
        backend.get("!store::form").unwrap(),
        Some("5".to_string())
    );
}

#[test]
fn test_sqlite_round_trip_across_registries() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let form = Form {
        name: "ada".into(),
        age: 36,
    };

    {
        let backend = Arc::new(SqlitePersistence::open(&path).unwrap());
        let registry = Registry::default().with_sync_persistence(backend);
        let store = registry
            .get_or_create("form", Form { name: String::new(), age: 0 }, StoreOptions::persisted())
            .unwrap();
        store.set_state(form.clone());
    }

    let backend = Arc::new(SqlitePersistence::open(&path).unwrap());
    let registry = Registry::default().with_sync_persistence(backend);
    let store = registry
        .get_or_create("form", Form { name: String::new(), age: 0 }, StoreOptions::persisted())
        .unwrap();
    assert_eq!(store.get(), form);
}

#[test]
fn test_quota_failure_keeps_state_usable() {
    let backend = Arc::new(MemoryPersistence::with_capacity(32));
    let registry = Registry::default().with_sync_persistence(backend);
    let store = registry
        .get_or_create("note", String::new(), StoreOptions::persisted())
        .unwrap();
    let probe = Probe::new();
    store.subscribe(probe.callback());

    let long = "x".repeat(64);
    store.set_state(long.clone());

    assert_eq!(store.get(), long);
    assert_eq!(probe.seen(), vec![long]);
    assert!(matches!(
        store.last_error().as_deref(),
        Some(PersistError::QuotaExceeded { .. })
    ));

    store.set_state("ok".to_string());
    assert!(store.last_error().is_none());
}

#[test]
fn test_clear_persisted_leaves_live_store() {
    let backend = Arc::new(MemoryPersistence::new());
    let registry = Registry::default().with_sync_persistence(backend.clone());
    let store = registry.get_or_create("form", 1, StoreOptions::persisted()).unwrap();
    store.set_state(5);

    registry.clear_persisted("form").unwrap();
    assert!(backend.is_empty());
    assert_eq!(store.get(), 5);

    let fresh = Registry::default().with_sync_persistence(backend);
    let store = fresh.get_or_create("form", 1, StoreOptions::persisted()).unwrap();
    assert_eq!(store.get(), 1);
}

#[tokio::test]
async fn test_async_backend_round_trip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    {
        let backend = Arc::new(Blocking::new(SqlitePersistence::open(&path).unwrap()));
        let registry = Registry::default().with_async_persistence(backend.clone());
        let store = registry
            .get_or_create_async("counter", 0, StoreOptions::persisted())
            .await
            .unwrap();
        store.set_state(42);

        // Wait for the spawned write to land.
        for _ in 0..100 {
            if backend.inner().count().unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    let backend = Arc::new(Blocking::new(SqlitePersistence::open(&path).unwrap()));
    let registry = Registry::default().with_async_persistence(backend);
    let store = registry
        .get_or_create_async("counter", 0, StoreOptions::persisted())
        .await
        .unwrap();
    assert_eq!(store.get(), 42);

    registry.clear_persisted_async("counter").await.unwrap();
    assert_eq!(store.get(), 42);
}

#[tokio::test]
async fn test_late_resolution_never_clobbers_newer_value() {
    let gated = Arc::new(GatedPersistence::new());
    let registry = Registry::default().with_async_persistence(gated.clone());
    let store = registry
        .get_or_create_async("form", 0, StoreOptions::persisted())
        .await
        .unwrap();
    let probe = Probe::new();
    store.subscribe(probe.callback());

    store.set_state(1);
    gated.wait_for_pending(1).await;
    store.set_state(2);
    gated.wait_for_pending(2).await;
    assert_eq!(gated.pending_keys(), vec!["!store::form", "!store::form"]);

    gated.resolve_newest(WriteOutcome::Commit);
    gated.resolve_oldest(WriteOutcome::Reject("late failure".into()));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(store.get(), 2);
    assert_eq!(probe.seen(), vec![1, 2]);
    // The failure belongs to a write that was already superseded by a
    // successful one.
    assert!(store.last_error().is_none());
}

#[tokio::test]
async fn test_local_write_beats_slow_hydration() {
    let gated = Arc::new(GatedPersistence::new());
    gated.seed("!store::form", "9");
    let registry = Registry::default().with_async_persistence(gated.clone());

    let store = registry.get_or_create("form", 1, StoreOptions::persisted()).unwrap();
    store.set_state(3);
    store.hydrate().await;

    assert_eq!(store.get(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_peer_context_receives_value() {
    init_tracing();
    let hub = MemoryHub::new();
    let left = context(&hub);
    let right = context(&hub);

    let a = left.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let b = right.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let seen_a = Probe::new();
    let seen_b = Probe::new();
    a.subscribe(seen_a.callback());
    b.subscribe(seen_b.callback());

    a.set_state(7);
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(b.get(), 7);
    assert_eq!(seen_b.seen(), vec![7]);

    // Applying a peer value does not publish it back.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(seen_a.seen(), vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_collapses_to_latest() {
    let hub = MemoryHub::new();
    let left = context(&hub);
    let right = context(&hub);

    let a = left.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let b = right.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let probe = Probe::new();
    b.subscribe(probe.callback());

    for v in 1..=10 {
        a.set_state(v);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(probe.seen(), vec![10]);
}

#[tokio::test(start_paused = true)]
async fn test_own_echo_ignored() {
    let hub = MemoryHub::with_loopback();
    let registry = context(&hub);
    let store = registry.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let probe = Probe::new();
    store.subscribe(probe.callback());

    store.set_state(1);
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(probe.seen(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_envelopes_validated_on_apply() {
    let hub = MemoryHub::new();
    let registry = context(&hub);
    let store = registry.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let local = store.instance_id().as_str().to_string();

    assert!(store.apply_inbound(&json!({ "instanceId": "peer", "message": 7 })));
    assert_eq!(store.get(), 7);

    assert!(!store.apply_inbound(&json!({ "instanceId": local, "message": 8 })));
    assert!(!store.apply_inbound(&json!({})));
    assert!(!store.apply_inbound(&json!("7")));
    assert_eq!(store.get(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_off_never_opens_channel() {
    let hub = MemoryHub::new();
    let registry = context(&hub);
    let store = registry.get_or_create("quiet", 0, StoreOptions::new()).unwrap();

    assert!(!store.is_broadcasting());
    assert_eq!(hub.endpoint_count("!store::quiet"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_coalesce_interval() {
    let hub = MemoryHub::new();
    let config = RegistryConfig::default().with_coalesce_interval(Duration::from_millis(50));
    let left = Registry::new(config.clone()).with_broadcaster(Arc::new(hub.clone()));
    let right = Registry::new(config).with_broadcaster(Arc::new(hub.clone()));

    let a = left.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();
    let b = right.get_or_create("sync", 0, StoreOptions::broadcasting()).unwrap();

    a.set_state(4);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(b.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_persisted_and_broadcast_together() {
    let hub = MemoryHub::new();
    let disk = Arc::new(MemoryPersistence::new());
    let left = context(&hub).with_sync_persistence(disk.clone());
    let right = context(&hub).with_sync_persistence(disk.clone());

    let options = StoreOptions::persisted().with_broadcast(true);
    let a = left.get_or_create("both", 0, options).unwrap();
    let b = right.get_or_create("both", 0, options).unwrap();

    a.set_state(9);
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(b.get(), 9);
    assert_eq!(
        disk.get("!store::both").unwrap(),
        Some("9".to_string())
    );
}
