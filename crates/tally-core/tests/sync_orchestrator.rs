//! End-to-end orchestrator behavior against the in-memory remote, under
//! paused Tokio time.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tally_core::backup::parse_backup;
use tally_core::cache::LocalCache;
use tally_core::clock::{Clock, ManualClock};
use tally_core::model::TransactionType;
use tally_core::model::stamp::parse_iso;
use tally_core::mutation::{NewItem, TransactionDraft, TransactionPatch};
use tally_core::remote::{FaultMode, MemoryRemote, RemoteStore};
use tally_core::snapshot::Category;
use tally_core::sync::{SyncConfig, SyncErrorKind, SyncOrchestrator, SyncOutcome, SyncState};
use tally_core::{AccountKey, Ledger};
use tokio_util::sync::CancellationToken;

fn account() -> AccountKey {
    AccountKey::new("Shop@Example.com").expect("valid account")
}

fn device(
    remote: &Arc<MemoryRemote>,
    start: &str,
    config: SyncConfig,
) -> (SyncOrchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(parse_iso(start).expect("valid start")));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let cache = LocalCache::open_in_memory().expect("in-memory cache");
    let ledger = Ledger::load(account(), &cache, dyn_clock);
    let remote: Arc<dyn RemoteStore> = remote.clone();
    (
        SyncOrchestrator::new(ledger, cache, Some(remote), config),
        clock,
    )
}

fn synced(outcome: &SyncOutcome) -> bool {
    matches!(outcome, SyncOutcome::Synced(_))
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_inside_debounce_window_syncs_once() {
    let remote = Arc::new(MemoryRemote::new());
    let (orch, clock) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    let customer = orch.mutate(|l| l.add_customer("Asha", "555")).expect("add");
    orch.mutate(|l| {
        l.add_transaction(&customer.id, TransactionDraft::new(TransactionType::Gave, 10.0))
    })
    .expect("first tx");

    tokio::time::sleep(Duration::from_millis(1000)).await;
    clock.advance(chrono::Duration::seconds(1));
    orch.mutate(|l| {
        l.add_transaction(&customer.id, TransactionDraft::new(TransactionType::Got, 4.0))
    })
    .expect("second tx");
    assert_eq!(remote.save_count(Category::Customers), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(remote.save_count(Category::Customers), 1);
    assert_eq!(remote.fetch_count(), 3);
    let pushed = remote.get(&account(), Category::Customers).expect("pushed");
    assert_eq!(pushed["data"][0]["transactions"].as_array().map(Vec::len), Some(2));
    assert!(!orch.status().dirty);
    assert_eq!(orch.status().state, SyncState::Idle);
}

#[tokio::test(start_paused = true)]
async fn fresh_account_with_rejected_credentials_reports_auth_error() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_fault(FaultMode::Auth);
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    let outcome = orch.on_foreground().await;

    assert_eq!(outcome, SyncOutcome::Failed(SyncErrorKind::Auth));
    let status = orch.status();
    assert_eq!(status.state, SyncState::Error(SyncErrorKind::Auth));
    assert!(status.suspended);
    assert_eq!(status.label(), "needs-attention");
    orch.read(|l| {
        assert!(l.customers().is_empty());
        assert!(l.items().is_empty());
    });
}

#[tokio::test(start_paused = true)]
async fn network_failure_keeps_local_edits_and_retries_on_next_tick() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_fault(FaultMode::Network);
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    orch.mutate(|l| l.add_customer("Asha", "555")).expect("add");
    assert_eq!(orch.flush().await, SyncOutcome::Failed(SyncErrorKind::Network));
    let status = orch.status();
    assert_eq!(status.label(), "offline");
    assert!(status.dirty);
    assert!(!status.suspended);
    assert_eq!(orch.read(|l| l.customers().len()), 1);

    remote.set_fault(FaultMode::Healthy);
    assert!(synced(&orch.tick().await));
    assert!(!orch.status().dirty);
    assert_eq!(remote.save_count(Category::Customers), 1);
}

#[tokio::test(start_paused = true)]
async fn failsafe_clears_syncing_when_remote_hangs() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_fault(FaultMode::Hang);
    let config = SyncConfig {
        request_timeout: Duration::from_secs(600),
        ..SyncConfig::default()
    };
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", config);

    let started = tokio::time::Instant::now();
    let outcome = orch.tick().await;

    assert_eq!(outcome, SyncOutcome::Failed(SyncErrorKind::Network));
    assert!(started.elapsed() >= config.failsafe);
    assert!(started.elapsed() < config.request_timeout);
    let status = orch.status();
    assert_eq!(status.state, SyncState::Error(SyncErrorKind::Network));
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("timed out"))
    );
}

#[tokio::test(start_paused = true)]
async fn import_is_merged_not_overwritten() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(
        &account(),
        Category::Items,
        json!({"data": [{"id": "remote-item", "name": "Rice", "price": 2.0}], "timestamp": 1}),
    );
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    let backup = parse_backup(r#"{"customers": [{"id": "c-imp", "name": "Bilal", "phone": "9"}]}"#)
        .expect("valid backup");
    assert!(backup.items.is_empty());
    orch.mutate(|l| {
        l.apply_import(&backup.customers, &backup.items);
        Ok::<_, std::convert::Infallible>(())
    })
    .expect("import");
    assert!(synced(&orch.flush().await));

    let items = remote.get(&account(), Category::Items).expect("items pushed");
    assert_eq!(items["data"][0]["id"], "remote-item");
    let customers = remote.get(&account(), Category::Customers).expect("customers pushed");
    assert_eq!(customers["data"][0]["id"], "c-imp");
}

#[tokio::test(start_paused = true)]
async fn legacy_customers_are_never_wiped_from_the_cloud() {
    let remote = Arc::new(MemoryRemote::new());
    remote.put(
        &account(),
        Category::Customers,
        json!({"data": [
            {"id": "c-ok", "name": "Asha", "phone": "1", "transactions": []},
            {"id": "c-legacy", "name": "Bilal", "phone": "2", "transactions": [
                {"id": "t-old", "amount": "250", "type": "GAVE", "date": "2023-01-05"}
            ]},
            {"id": "c-future", "name": "Chen", "transactions": [
                {"id": "t-new", "amount": 5, "type": "REFUND"}
            ]}
        ], "timestamp": 1}),
    );
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    let outcome = orch.tick().await;
    let SyncOutcome::Synced(report) = outcome else {
        panic!("expected a completed sync, got {outcome:?}");
    };
    assert_eq!(report.pulled.customers, 2);
    assert_eq!(report.carried.customers, 1);

    orch.read(|l| {
        let legacy = l.customer("c-legacy").expect("string amount is coerced");
        assert!((legacy.transactions[0].amount - 250.0).abs() < f64::EPSILON);
        assert!(l.customer("c-future").is_none());
    });

    let pushed = remote.get(&account(), Category::Customers).expect("pushed");
    let ids: Vec<&str> = pushed["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["c-ok", "c-legacy", "c-future"]);
    assert_eq!(pushed["data"][2]["transactions"][0]["type"], "REFUND");
}

#[tokio::test(start_paused = true)]
async fn two_devices_converge_on_one_customer_ledger() {
    let remote = Arc::new(MemoryRemote::new());
    let (phone, phone_clock) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());
    let (tablet, tablet_clock) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    let customer = phone.mutate(|l| l.add_customer("Asha", "555")).expect("add");
    let tx = phone
        .mutate(|l| l.add_transaction(&customer.id, TransactionDraft::new(TransactionType::Gave, 10.0)))
        .expect("tx");
    assert!(synced(&phone.flush().await));
    assert!(synced(&tablet.tick().await));
    assert_eq!(tablet.read(|l| l.customers().len()), 1);

    // Concurrent offline edits: the phone corrects the amount, the tablet
    // records a payment.
    phone_clock.advance(chrono::Duration::minutes(5));
    tablet_clock.advance(chrono::Duration::minutes(6));
    phone
        .mutate(|l| {
            l.edit_transaction(
                &customer.id,
                &tx.id,
                TransactionPatch {
                    amount: Some(12.0),
                    ..TransactionPatch::default()
                },
            )
        })
        .expect("edit");
    let payment = tablet
        .mutate(|l| l.add_transaction(&customer.id, TransactionDraft::new(TransactionType::Got, 3.0)))
        .expect("payment");

    assert!(synced(&tablet.flush().await));
    assert!(synced(&phone.flush().await));
    assert!(synced(&tablet.tick().await));

    for device in [&phone, &tablet] {
        device.read(|l| {
            let c = l.customer(&customer.id).expect("customer survives");
            assert_eq!(c.transactions.len(), 2);
            let edited = c.transaction(&tx.id).expect("edited tx");
            assert!((edited.amount - 12.0).abs() < f64::EPSILON);
            assert!(c.transaction(&payment.id).is_some());
        });
    }
}

#[tokio::test(start_paused = true)]
async fn deletion_on_one_device_removes_stale_copy_on_another() {
    let remote = Arc::new(MemoryRemote::new());
    let (phone, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());
    let (tablet, tablet_clock) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    let customer = phone.mutate(|l| l.add_customer("Asha", "555")).expect("add");
    let tx = phone
        .mutate(|l| l.add_transaction(&customer.id, TransactionDraft::new(TransactionType::Gave, 7.0)))
        .expect("tx");
    assert!(synced(&phone.flush().await));
    assert!(synced(&tablet.tick().await));

    phone
        .mutate(|l| l.delete_transaction(&customer.id, &tx.id))
        .expect("delete");
    assert!(synced(&phone.flush().await));

    // The tablet edits the same entry later than the deletion, offline.
    tablet_clock.advance(chrono::Duration::hours(1));
    tablet
        .mutate(|l| {
            l.edit_transaction(
                &customer.id,
                &tx.id,
                TransactionPatch {
                    description: Some("late edit".into()),
                    ..TransactionPatch::default()
                },
            )
        })
        .expect("stale edit");
    assert!(synced(&tablet.flush().await));
    assert!(synced(&phone.tick().await));

    for device in [&phone, &tablet] {
        device.read(|l| {
            assert!(l.tombstones().contains(&tx.id));
            let c = l.customer(&customer.id).expect("customer survives");
            assert!(c.transaction(&tx.id).is_none());
        });
    }
}

#[tokio::test(start_paused = true)]
async fn coalesced_request_triggers_follow_up_when_dirty() {
    let remote = Arc::new(MemoryRemote::new());
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());

    orch.mutate(|l| {
        l.add_item(&NewItem {
            name: "Tea".into(),
            price: 1.0,
            unit: None,
        })
    })
    .expect("item");

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.flush().await })
    };
    tokio::task::yield_now().await;
    // Lands while the first cycle is in flight.
    orch.mutate(|l| {
        l.add_item(&NewItem {
            name: "Milk".into(),
            price: 2.0,
            unit: None,
        })
    })
    .expect("item");
    let second = orch.refresh().await;

    assert!(synced(&first.await.expect("join")));
    assert!(matches!(second, SyncOutcome::Coalesced | SyncOutcome::Synced(_)));
    let items = remote.get(&account(), Category::Items).expect("items pushed");
    assert_eq!(items["data"].as_array().map(Vec::len), Some(2));
    assert!(!orch.status().dirty);
}

#[tokio::test(start_paused = true)]
async fn background_loop_pulls_until_cancelled() {
    let remote = Arc::new(MemoryRemote::new());
    let (orch, _) = device(&remote, "2024-06-01T10:00:00Z", SyncConfig::default());
    let mut status = orch.subscribe();

    let cancel = CancellationToken::new();
    let handle = orch.spawn_background(cancel.clone());

    tokio::time::sleep(Duration::from_secs(65)).await;
    // Ticks at 0s, 30s and 60s, three fetches each.
    assert_eq!(remote.fetch_count(), 9);
    assert!(status.has_changed().expect("sender alive"));
    assert!(status.borrow_and_update().last_synced_at.is_some());

    cancel.cancel();
    handle.await.expect("loop exits");
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(remote.fetch_count(), 9);
}

#[tokio::test(start_paused = true)]
async fn suspension_survives_restart_until_refresh() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tally.sqlite3");
    let remote = Arc::new(MemoryRemote::new());
    remote.set_fault(FaultMode::Auth);

    let open = || {
        let cache = LocalCache::open(&path).expect("open cache");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            parse_iso("2024-06-01T10:00:00Z").expect("start"),
        ));
        let ledger = Ledger::load(account(), &cache, clock);
        let dyn_remote: Arc<dyn RemoteStore> = remote.clone();
        SyncOrchestrator::new(ledger, cache, Some(dyn_remote), SyncConfig::default())
    };

    let first = open();
    first.mutate(|l| l.add_customer("Asha", "555")).expect("add");
    assert_eq!(first.flush().await, SyncOutcome::Failed(SyncErrorKind::Auth));
    drop(first);

    let second = open();
    assert!(second.is_suspended());
    assert!(second.status().dirty);
    assert_eq!(second.read(|l| l.customers().len()), 1);
    assert_eq!(second.tick().await, SyncOutcome::Suspended);

    remote.set_fault(FaultMode::Healthy);
    assert!(synced(&second.refresh().await));
    assert!(!second.status().suspended);
    assert_eq!(remote.save_count(Category::Customers), 1);
}
