//! Multi-node scenarios: several "processes" on one shared store.

use corral_core::transaction::Propagation;
use corral_core::{CoreError, EngineEvent, LockTarget, Timestamp};
use corral_testkit::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn two_nodes_elect_lowest_index_as_server() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();

    assert!(n1.index() < n2.index());
    assert_eq!(n1.coordinator().current_server(), Some(n1.index()));
    assert_eq!(n2.coordinator().current_server(), Some(n1.index()));
    assert!(n1.coordinator().is_server());
    assert!(!n2.coordinator().is_server());

    n2.shutdown().unwrap();
    cluster.assert_baseline(&n1);
}

#[test]
fn save_through_one_node_visible_to_the_other() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();

    let key = key_of(DOG);
    cluster.persist(&n1, key, b"rex");

    let seen = n2.engine().ledger().read_current(key).unwrap().unwrap();
    assert_eq!(seen.payload, b"rex");
}

#[test]
fn stale_save_from_first_writer_fails_with_contention() {
    let cluster = TestCluster::new();
    let p1 = cluster.launch_node();
    let p2 = cluster.launch_node();

    // P1 saves X.
    let key = key_of(DOG);
    let stale = cluster.persist(&p1, key, b"v1");

    // P2 loads X, modifies it and saves: must succeed.
    let e2 = p2.engine();
    let loaded = e2.ledger().read_current(key).unwrap().unwrap();
    e2.run_in_transaction(|txn| {
        e2.ledger()
            .record_update(txn, key, b"v2".to_vec(), loaded.stamp)?;
        Ok(())
    })
    .unwrap();

    // P1 saving its stale copy must fail with a contention error.
    let e1 = p1.engine();
    let err = e1
        .run_in_transaction(|txn| {
            e1.ledger().record_update(txn, key, b"v3".to_vec(), stale)?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_contention());

    // The ensure-current path agrees, even though P1's own commit had
    // primed its recency cache: P2's commit invalidated it.
    let txn = e1.transactions().get(Propagation::New).unwrap();
    e1.transactions().begin(&txn).unwrap();
    let err = e1
        .locks()
        .lock_ensure_current(&txn, LockTarget::Object(key), stale, None)
        .unwrap_err();
    assert!(matches!(err, CoreError::ConcurrentModification { .. }));
    e1.transactions().rollback(&txn).unwrap();
}

#[test]
fn commit_on_one_node_invalidates_peer_caches() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();

    let rx = n1.engine().subscribe();
    let key = key_of(DOG);
    cluster.persist(&n2, key, b"rex");

    let saw_invalidation = rx
        .try_iter()
        .any(|s| matches!(s.event, EngineEvent::CachesInvalidated { type_id: Some(t) } if t == DOG));
    assert!(saw_invalidation, "peer must drop its cached knowledge of Dog");
}

#[test]
fn lock_on_one_node_blocks_the_other_until_released() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();

    let key = key_of(DOG);
    let target = LockTarget::Object(key);

    let e1 = n1.engine();
    let txn1 = e1.transactions().get(Propagation::Required).unwrap();
    txn1.set_session_param("user", "p1").unwrap();
    e1.transactions().begin(&txn1).unwrap();
    e1.locks().lock(&txn1, target, None).unwrap();

    // A bounded attempt from the other node times out and names the holder.
    {
        let e2 = n2.engine();
        let txn2 = e2.transactions().get(Propagation::Required).unwrap();
        e2.transactions().begin(&txn2).unwrap();
        let err = e2
            .locks()
            .lock(&txn2, target, Some(Duration::from_millis(40)))
            .unwrap_err();
        assert_eq!(err.holder_session().unwrap().get("user"), Some("p1"));
        e2.transactions().rollback(&txn2).unwrap();
    }

    // An unbounded attempt blocks until the holder's commit releases it.
    let (locked_tx, locked_rx) = mpsc::channel();
    let e2 = std::sync::Arc::clone(n2.engine());
    let waiter = thread::spawn(move || {
        let txn2 = e2.transactions().get(Propagation::Required).unwrap();
        e2.transactions().begin(&txn2).unwrap();
        e2.locks().lock(&txn2, target, None).unwrap();
        locked_tx.send(()).unwrap();
        e2.transactions().commit(&txn2).unwrap();
    });

    assert!(locked_rx.recv_timeout(Duration::from_millis(50)).is_err());
    e1.transactions().commit(&txn1).unwrap();
    assert!(locked_rx.recv_timeout(Duration::from_secs(2)).is_ok());
    waiter.join().unwrap();
}

#[test]
fn server_loss_fails_inflight_commit_then_failover_recovers() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();
    assert!(n1.coordinator().is_server());

    // A transaction is in flight on N2 when the server dies.
    let e2 = n2.engine();
    let txn = e2.transactions().get(Propagation::Required).unwrap();
    e2.transactions().begin(&txn).unwrap();
    e2.ledger()
        .record_create(&txn, key_of(DOG), b"doomed".to_vec())
        .unwrap();

    cluster.kill(&n1);

    // The in-flight commit fails hard rather than silently succeeding.
    let err = e2.transactions().commit(&txn).unwrap_err();
    assert!(matches!(err, CoreError::Coordination { .. }));
    assert!(txn.is_rolled_back());

    // The survivor detects the loss and takes over as server.
    n2.coordinator().tick().unwrap();
    assert_eq!(n2.coordinator().current_server(), Some(n2.index()));
    assert!(n2.coordinator().is_server());

    // A save issued through N2 afterward succeeds.
    let key = key_of(DOG);
    cluster.persist(&n2, key, b"alive");
    assert_eq!(
        e2.ledger().read_current(key).unwrap().unwrap().payload,
        b"alive"
    );
    cluster.assert_baseline(&n2);
}

#[test]
fn dirty_restart_forces_full_invalidation_everywhere() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node_at("127.0.0.1:7777", corral_core::CoreConfig::default());

    // Prime N1's caches, then watch for the invalidation.
    cluster.persist(&n1, key_of(DOG), b"cached");
    let rx = n1.engine().subscribe();

    // N2 dies and comes back at the same address: a tear-down/set-up
    // restart. Nobody may assume continuity.
    cluster.kill(&n2);
    let n2b = cluster.launch_node_at("127.0.0.1:7777", corral_core::CoreConfig::default());

    let saw_full_invalidation = rx
        .try_iter()
        .any(|s| matches!(s.event, EngineEvent::CachesInvalidated { type_id: None }));
    assert!(saw_full_invalidation);
    assert!(n1.engine().stats().invalidations() > 0);

    n2b.shutdown().unwrap();
    n1.coordinator().tick().unwrap();
    cluster.assert_baseline(&n1);
}

#[test]
fn unlock_on_one_node_unblocks_waiter_on_another() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();

    let target = LockTarget::Type(VEHICLE);
    let e1 = n1.engine();
    let txn1 = e1.transactions().get(Propagation::Required).unwrap();
    e1.transactions().begin(&txn1).unwrap();
    e1.locks().lock(&txn1, target, None).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let e2 = std::sync::Arc::clone(n2.engine());
    let waiter = thread::spawn(move || {
        let txn2 = e2.transactions().get(Propagation::Required).unwrap();
        e2.transactions().begin(&txn2).unwrap();
        e2.locks().lock(&txn2, target, None).unwrap();
        done_tx.send(()).unwrap();
        e2.transactions().commit(&txn2).unwrap();
    });

    thread::sleep(Duration::from_millis(30));
    // Explicit unlock, not commit: the waiter must wake on the unlock.
    e1.locks().unlock(&txn1, target).unwrap();
    assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
    waiter.join().unwrap();
    e1.transactions().commit(&txn1).unwrap();
}

#[test]
fn clean_departure_restores_single_row_baseline() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();
    let n3 = cluster.launch_node();

    assert_eq!(n1.coordinator().registry().row_count().unwrap(), 3);

    n3.shutdown().unwrap();
    n2.shutdown().unwrap();
    cluster.assert_baseline(&n1);

    // Still fully operational alone.
    let key = key_of(MAMMAL);
    cluster.persist(&n1, key, b"solo");
    cluster.assert_baseline(&n1);
}

#[test]
fn reference_stamp_zero_means_never_persisted_cluster_wide() {
    let cluster = TestCluster::new();
    let n1 = cluster.launch_node();
    let n2 = cluster.launch_node();

    // N2 locks a brand-new object, ensures currency and saves it.
    let key = key_of(DOG);
    let e2 = n2.engine();
    e2.run_in_transaction(|txn| {
        e2.locks()
            .lock_ensure_current(txn, LockTarget::Object(key), Timestamp::ZERO, None)?;
        e2.ledger().record_create(txn, key, b"pup".to_vec())
    })
    .unwrap();

    // Once persisted, the zero reference is stale everywhere.
    let e1 = n1.engine();
    let txn = e1.transactions().get(Propagation::New).unwrap();
    e1.transactions().begin(&txn).unwrap();
    let err = e1
        .locks()
        .lock_ensure_current(&txn, LockTarget::Object(key), Timestamp::ZERO, None)
        .unwrap_err();
    assert!(matches!(err, CoreError::ConcurrentModification { .. }));
    e1.transactions().rollback(&txn).unwrap();
}
