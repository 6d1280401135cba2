//! Integration tests for tether-discovery

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_discovery::*;
use tether_log::{Level, LogConfig, Logger};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);
const KEY: &str = "svc/10.0.0.1:9000";

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn registrar_with(
    store: &InMemoryStore,
    address: Address,
    ttl: i64,
) -> (Arc<Registrar<InMemoryStore>>, Captured) {
    let captured = Captured::default();
    let config = LogConfig::default()
        .with_level(Level::Debug)
        .with_timestamps(false);
    let logger = Arc::new(Logger::with_writer(config, captured.clone()));

    let registrar = Registrar::new(store.clone(), "svc", address, ttl, logger);
    (Arc::new(registrar), captured)
}

fn registrar(store: &InMemoryStore, ttl: i64) -> (Arc<Registrar<InMemoryStore>>, Captured) {
    registrar_with(store, Address::new("10.0.0.1:9000"), ttl)
}

fn spawn_keep_alive(
    registrar: &Arc<Registrar<InMemoryStore>>,
) -> JoinHandle<Result<(), DiscoveryError>> {
    let registrar = registrar.clone();
    tokio::spawn(async move { registrar.keep_alive().await })
}

async fn join(handle: JoinHandle<Result<(), DiscoveryError>>) -> Result<(), DiscoveryError> {
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("keep_alive did not return")
        .expect("keep_alive panicked")
}

async fn wait_for(store: &InMemoryStore, op: StoreOp, n: usize) {
    tokio::time::timeout(WAIT, store.wait_for_count(op, n))
        .await
        .expect("store call never arrived");
}

async fn wait_for_log(captured: &Captured, needle: &str) {
    tokio::time::timeout(WAIT, async {
        while !captured.text().contains(needle) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("log line {:?} never appeared in {:?}", needle, captured.text()));
}

#[tokio::test]
async fn test_registers_then_streams() {
    let store = InMemoryStore::new();
    let (registrar, captured) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    let lease = LeaseId(1);
    assert_eq!(registrar.lease().await, Some(lease));
    assert_eq!(
        store.calls().await,
        vec![
            StoreCall::Grant { ttl: 5 },
            StoreCall::Update {
                target: "svc".to_string(),
                op: Operation::Add,
                addr: "10.0.0.1:9000".to_string(),
                lease: Some(lease),
            },
            StoreCall::KeepAlive(lease),
        ]
    );
    assert_eq!(
        store.get(KEY).await.as_deref(),
        Some(r#"{"Op":0,"Addr":"10.0.0.1:9000","Metadata":""}"#)
    );
    assert_eq!(store.lease_of(KEY).await, Some(lease));
    assert!(captured
        .text()
        .contains("[INF] [discovery] register service(svc/10.0.0.1:9000) into etcd\n"));

    store.renew(lease).await;
    wait_for_log(&captured, "[DBG] [discovery] service keepalive (lease 1, ttl 5s)").await;

    tokio_test::assert_ok!(registrar.close().await);
    assert!(join(handle).await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_metadata_is_published() {
    let store = InMemoryStore::new();
    let address = Address::new("10.0.0.2:9000").with_metadata("zone=eu");
    let (registrar, _) = registrar_with(&store, address, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    assert_eq!(
        store.get("svc/10.0.0.2:9000").await.as_deref(),
        Some(r#"{"Op":0,"Addr":"10.0.0.2:9000","Metadata":"zone=eu"}"#)
    );

    registrar.close().await.unwrap();
    join(handle).await.unwrap_err();
}

#[tokio::test]
async fn test_second_keep_alive_is_invalid_call() {
    let store = InMemoryStore::new();
    let (registrar, _) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;
    let before = store.calls().await.len();

    let second = registrar.keep_alive().await;
    assert!(matches!(second, Err(DiscoveryError::InvalidCall)));
    assert_eq!(store.calls().await.len(), before);

    registrar.close().await.unwrap();
    join(handle).await.unwrap_err();
}

#[tokio::test]
async fn test_close_twice() {
    let store = InMemoryStore::new();
    let (registrar, _) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    tokio_test::assert_ok!(registrar.close().await);
    let updates = store.count(StoreOp::Update).await;
    let revokes = store.count(StoreOp::Revoke).await;
    assert_eq!((updates, revokes), (2, 1));

    let second = tokio_test::assert_err!(registrar.close().await);
    assert!(matches!(second, DiscoveryError::Closed));
    assert_eq!(store.count(StoreOp::Update).await, updates);
    assert_eq!(store.count(StoreOp::Revoke).await, revokes);

    join(handle).await.unwrap_err();
}

#[tokio::test]
async fn test_close_unblocks_keep_alive() {
    let store = InMemoryStore::new();
    let (registrar, _) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    registrar.close().await.unwrap();

    let err = join(handle).await.unwrap_err();
    assert!(
        matches!(err, DiscoveryError::Cancelled | DiscoveryError::Closed),
        "unexpected {:?}",
        err
    );

    let again = registrar.keep_alive().await;
    assert!(matches!(again, Err(DiscoveryError::Closed)));
}

#[tokio::test]
async fn test_close_while_registration_hangs() {
    let store = InMemoryStore::new();
    store.inject(StoreOp::Grant, 1, Fault::Hang).await;
    let (registrar, _) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::Grant, 1).await;

    registrar.close().await.unwrap();
    assert!(matches!(join(handle).await, Err(DiscoveryError::Cancelled)));
    assert_eq!(store.count(StoreOp::Revoke).await, 0);
}

#[tokio::test]
async fn test_reregisters_when_stream_ends() {
    let store = InMemoryStore::new();
    let (registrar, captured) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    let first = LeaseId(1);
    store.renew(first).await;
    wait_for_log(&captured, "service keepalive (lease 1, ttl 5s)").await;

    store.end_streams(first).await;
    wait_for(&store, StoreOp::Revoke, 1).await;

    let second = LeaseId(2);
    assert_eq!(store.count(StoreOp::Grant).await, 2);
    assert_eq!(registrar.lease().await, Some(second));
    assert!(store.calls().await.contains(&StoreCall::KeepAlive(second)));
    assert!(store.calls().await.contains(&StoreCall::Revoke(first)));
    assert!(!store.is_live(first).await);
    assert_eq!(store.lease_of(KEY).await, Some(second));
    assert!(captured.text().contains("[WRN] [discovery] keepalive of service(svc/10.0.0.1:9000) stopped"));

    // still streaming on the new lease
    assert!(store.renew(second).await);
    wait_for_log(&captured, "service keepalive (lease 2, ttl 5s)").await;

    registrar.close().await.unwrap();
    join(handle).await.unwrap_err();
}

#[tokio::test]
async fn test_reregisters_after_lease_expiry() {
    let store = InMemoryStore::new();
    let (registrar, captured) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    store.expire(LeaseId(1)).await;
    assert!(store.get(KEY).await.is_none() || store.lease_of(KEY).await == Some(LeaseId(2)));

    wait_for(&store, StoreOp::Revoke, 1).await;
    assert_eq!(store.lease_of(KEY).await, Some(LeaseId(2)));
    wait_for_log(&captured, "stale lease 1 not revoked").await;

    registrar.close().await.unwrap();
    join(handle).await.unwrap_err();
    assert!(store.get(KEY).await.is_none());
    assert_eq!(store.lease_count().await, 0);
}

#[tokio::test]
async fn test_reregistration_grant_failure_stops_keep_alive() {
    let store = InMemoryStore::new();
    store
        .inject(StoreOp::Grant, 2, Fault::Fail("etcdserver: no leader".into()))
        .await;
    let (registrar, _) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    store.expire(LeaseId(1)).await;

    match join(handle).await {
        Err(DiscoveryError::Store(StoreError::Unavailable(message))) => {
            assert_eq!(message, "etcdserver: no leader")
        }
        other => panic!("unexpected {:?}", other),
    }

    let calls = store.calls().await;
    assert_eq!(calls.last(), Some(&StoreCall::Grant { ttl: 5 }));
    assert_eq!(store.count(StoreOp::Grant).await, 2);
    assert_eq!(store.count(StoreOp::Revoke).await, 0);

    // the lapsed lease stays recorded for close
    assert_eq!(registrar.lease().await, Some(LeaseId(1)));
}

#[tokio::test]
async fn test_close_deletes_then_revokes() {
    let store = InMemoryStore::new();
    let (registrar, captured) = registrar(&store, 5);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;
    let before = store.calls().await.len();

    registrar.close().await.unwrap();

    let calls = store.calls().await;
    assert_eq!(
        calls[before..],
        [
            StoreCall::Update {
                target: "svc".to_string(),
                op: Operation::Delete,
                addr: "10.0.0.1:9000".to_string(),
                lease: None,
            },
            StoreCall::Revoke(LeaseId(1)),
        ]
    );
    assert!(store.get(KEY).await.is_none());
    assert!(!store.is_live(LeaseId(1)).await);
    assert!(captured
        .text()
        .contains("[INF] [discovery] unregister service(svc/10.0.0.1:9000) from etcd\n"));

    join(handle).await.unwrap_err();
}

#[tokio::test(start_paused = true)]
async fn test_close_is_bounded_when_store_hangs() {
    let store = InMemoryStore::new();
    store.inject(StoreOp::Update, 2, Fault::Hang).await;
    store.inject(StoreOp::Revoke, 1, Fault::Hang).await;
    let (registrar, captured) = registrar(&store, 3);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 1).await;

    let started = tokio::time::Instant::now();
    registrar.close().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(6), "closed after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(7), "closed after {:?}", elapsed);

    let text = captured.text();
    assert!(text.contains("[ERR] [discovery] delete service error - Deadline exceeded after 3s"));
    assert!(text.contains("[ERR] [discovery] revoke lease error - Deadline exceeded after 3s"));

    join(handle).await.unwrap_err();
}

#[tokio::test]
async fn test_failed_publish_keeps_lease_for_close() {
    let store = InMemoryStore::new();
    store
        .inject(StoreOp::Update, 1, Fault::Fail("put rejected".into()))
        .await;
    let (registrar, _) = registrar(&store, 5);

    let result = registrar.keep_alive().await;
    assert!(matches!(
        result,
        Err(DiscoveryError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(registrar.lease().await, Some(LeaseId(1)));
    assert!(store.is_live(LeaseId(1)).await);

    registrar.close().await.unwrap();
    assert_eq!(store.count(StoreOp::Update).await, 1);
    assert!(store.calls().await.contains(&StoreCall::Revoke(LeaseId(1))));
    assert!(!store.is_live(LeaseId(1)).await);
}

#[tokio::test]
async fn test_keep_alive_reruns_after_failure() {
    let store = InMemoryStore::new();
    store
        .inject(StoreOp::KeepAlive, 1, Fault::Fail("stream refused".into()))
        .await;
    let (registrar, _) = registrar(&store, 5);

    assert!(registrar.keep_alive().await.is_err());
    assert!(store.is_live(LeaseId(1)).await);

    let handle = spawn_keep_alive(&registrar);
    wait_for(&store, StoreOp::KeepAlive, 2).await;
    wait_for(&store, StoreOp::Revoke, 1).await;

    // the first lease was displaced and revoked, not orphaned
    assert!(!store.is_live(LeaseId(1)).await);
    assert_eq!(store.lease_of(KEY).await, Some(LeaseId(2)));

    registrar.close().await.unwrap();
    join(handle).await.unwrap_err();
    assert_eq!(store.lease_count().await, 0);
}

#[tokio::test]
async fn test_registrars_are_independent() {
    let store = InMemoryStore::new();
    let (first, _) = registrar_with(&store, Address::new("10.0.0.1:9000"), 5);
    let (second, _) = registrar_with(&store, Address::new("10.0.0.2:9000"), 5);

    let first_handle = spawn_keep_alive(&first);
    let second_handle = spawn_keep_alive(&second);
    wait_for(&store, StoreOp::KeepAlive, 2).await;

    first.close().await.unwrap();
    join(first_handle).await.unwrap_err();

    assert!(store.get("svc/10.0.0.1:9000").await.is_none());
    assert!(store.get("svc/10.0.0.2:9000").await.is_some());
    assert!(!second.is_closed().await);

    second.close().await.unwrap();
    join(second_handle).await.unwrap_err();
    assert_eq!(store.lease_count().await, 0);
}
