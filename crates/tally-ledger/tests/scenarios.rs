//! End-to-end behavior of the fiscal and operational loggers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tally_crypto::{fiscal_entry_hash, HashChainVerifier};
use tally_ledger::{LedgerConfig, LedgerError, LedgerService, LogOutcome};
use tally_store::{FiscalLedgerStore, InMemoryDatabase, OperationalLedgerStore, PendingStore};
use tally_tse::{DeviceError, SoftwareTse};
use tally_types::{Document, PendingStatus, UserId};

use common::{in_memory, FailingDevice, HangingDevice, SlowDevice};

fn sale(amount: f64) -> Document {
    Document::from_value(&json!({ "amount": amount }))
}

#[tokio::test]
async fn first_fiscal_event_links_to_genesis() {
    let (db, service) = in_memory(Arc::new(SoftwareTse::generate()));

    let outcome = service
        .log_fiscal_event("sale", Some(UserId(7)), sale(12.50))
        .await
        .unwrap();

    let entries = db.fiscal_entries().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(Some(entry), outcome.entry());
    assert_eq!(entry.previous_log_hash.to_hex(), "0".repeat(64));
    assert_eq!(entry.sequence, 1);
    assert_eq!(entry.event_type, "sale");
    assert_eq!(entry.user_id, Some(UserId(7)));
    assert_eq!(entry.payload_for_tse, sale(12.50));
    assert_eq!(fiscal_entry_hash(entry).unwrap(), entry.current_log_hash);

    let row = db.pending(&outcome.operation_id()).unwrap().unwrap();
    assert_eq!(row.status, PendingStatus::Committed);
    assert_eq!(row.tse_response.as_ref(), Some(&entry.tse_response));
}

#[tokio::test]
async fn sequential_events_form_a_chain() {
    let (db, service) = in_memory(Arc::new(SoftwareTse::generate()));

    service
        .log_fiscal_event("sale", Some(UserId(1)), sale(3.0))
        .await
        .unwrap();
    service
        .log_fiscal_event("sale", Some(UserId(1)), sale(4.0))
        .await
        .unwrap();

    let entries = db.fiscal_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].previous_log_hash, entries[0].current_log_hash);
    assert!(HashChainVerifier::verify_chain(&entries).is_ok());

    // Swapping the rows and renumbering them does not yield a valid chain.
    let mut reordered = entries.clone();
    reordered.swap(0, 1);
    reordered[0].sequence = 1;
    reordered[1].sequence = 2;
    assert!(HashChainVerifier::verify_chain(&reordered).is_err());
}

#[tokio::test]
async fn device_failure_leaves_ledger_unchanged() {
    let device = Arc::new(FailingDevice::new());
    let (db, service) = in_memory(device.clone());
    let before = db.fiscal_count().unwrap();

    let outcome = service
        .log_fiscal_event("sale", Some(UserId(7)), sale(12.50))
        .await
        .unwrap();

    let LogOutcome::Failed { operation_id, error } = outcome else {
        panic!("expected a failed outcome");
    };
    assert!(matches!(error, DeviceError::Unavailable(_)));
    assert_eq!(db.fiscal_count().unwrap(), before);

    let row = db.pending(&operation_id).unwrap().unwrap();
    assert_eq!(row.status, PendingStatus::TseFailed);
    assert!(row.tse_response.is_none());
    assert!(row.last_error.unwrap().contains("device offline"));
    assert_eq!(device.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn device_timeout_is_a_device_failure() {
    let db = Arc::new(InMemoryDatabase::new());
    let service = LedgerService::new(
        db.clone(),
        Arc::new(HangingDevice),
        LedgerConfig {
            device_timeout: Duration::from_millis(50),
            ..LedgerConfig::default()
        },
    )
    .unwrap();

    let outcome = service
        .log_fiscal_event("sale", None, sale(1.0))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        LogOutcome::Failed { error: DeviceError::Timeout(_), .. }
    ));
    let row = db.pending(&outcome.operation_id()).unwrap().unwrap();
    assert_eq!(row.status, PendingStatus::TseFailed);
    assert_eq!(db.fiscal_count().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fiscal_events_do_not_fork() {
    let (db, service) = in_memory(Arc::new(SlowDevice::new(Duration::from_millis(20))));
    let service = Arc::new(service);

    let a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.log_fiscal_event("sale", Some(UserId(1)), sale(1.0)).await })
    };
    let b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.log_fiscal_event("sale", Some(UserId(2)), sale(2.0)).await })
    };
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert!(a.is_logged() && b.is_logged());

    let entries = db.fiscal_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(HashChainVerifier::verify_chain(&entries).is_ok());
    assert_ne!(entries[0].log_id, entries[1].log_id);
    service.ensure_intact().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_burst_keeps_both_chains_valid() {
    let (db, service) = in_memory(Arc::new(SlowDevice::new(Duration::from_millis(1))));
    let service = Arc::new(service);

    let mut tasks = Vec::new();
    for i in 0..24i64 {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service
                    .log_fiscal_event("sale", Some(UserId(i)), sale(i as f64))
                    .await
                    .map(|outcome| assert!(outcome.is_logged()))
            } else {
                service
                    .log_operational_event("login", Some(UserId(i)), Document::null())
                    .await
                    .map(|_| ())
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let fiscal = db.fiscal_entries().unwrap();
    let operational = db.operational_entries().unwrap();
    assert_eq!(fiscal.len(), 12);
    assert_eq!(operational.len(), 12);
    assert!(HashChainVerifier::verify_chain(&fiscal).is_ok());
    assert!(HashChainVerifier::verify_chain(&operational).is_ok());
    assert!(service.verify().unwrap().iter().all(|r| r.is_valid()));
}

#[tokio::test]
async fn every_fiscal_entry_has_a_signed_pending_row() {
    let db = Arc::new(InMemoryDatabase::new());
    let good = LedgerService::new(
        db.clone(),
        Arc::new(SoftwareTse::generate()),
        LedgerConfig::default(),
    )
    .unwrap();
    for i in 0..3 {
        good.log_fiscal_event("sale", None, sale(i as f64)).await.unwrap();
    }
    drop(good);

    let bad = common::service_with(db.clone(), Arc::new(FailingDevice::new()));
    for i in 0..2 {
        let outcome = bad.log_fiscal_event("sale", None, sale(i as f64)).await.unwrap();
        assert!(!outcome.is_logged());
    }

    let entries = db.fiscal_entries().unwrap();
    assert_eq!(entries.len(), 3);
    for entry in &entries {
        let row = db.pending(&entry.log_id.into()).unwrap().unwrap();
        assert_eq!(row.tse_response.as_ref(), Some(&entry.tse_response));
    }
    assert_eq!(
        db.pending_with_status(&[PendingStatus::TseFailed]).unwrap().len(),
        2
    );
}

#[tokio::test]
async fn operational_chain_is_independent() {
    let (db, service) = in_memory(Arc::new(SoftwareTse::generate()));

    service
        .log_fiscal_event("sale", None, sale(1.0))
        .await
        .unwrap();
    let op = service
        .log_operational_event("price_change", Some(UserId(4)), Document::from_value(&json!({"sku": "X"})))
        .await
        .unwrap();

    assert_eq!(op.sequence, 1);
    assert!(op.previous_log_hash.is_genesis());
    assert_eq!(db.operational_count().unwrap(), 1);
    assert_eq!(db.fiscal_count().unwrap(), 1);
}

#[tokio::test]
async fn staleness_shorter_than_a_device_call_is_rejected() {
    let result = LedgerService::new(
        Arc::new(InMemoryDatabase::new()),
        Arc::new(SlowDevice::new(Duration::from_millis(300))),
        LedgerConfig {
            device_timeout: Duration::from_secs(1),
            stale_after: Duration::from_millis(50),
            ..LedgerConfig::default()
        },
    );
    assert!(matches!(result, Err(LedgerError::InvalidConfig(_))));
}
