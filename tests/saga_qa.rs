//! Black-box QA for the transfer saga
//!
//! Drives the crate through its public API only: a mixed batch of good and
//! fault-injected transfers, followed by recovery sweeps, must leave every
//! transaction terminal and the total funds conserved.

use std::sync::Arc;
use std::time::Duration;

use docledger::{
    FailPoint, MemoryStore, RecoverySweeper, SweeperConfig, TransferCoordinator, TransferError,
    TransferRequest, TxnState,
};

fn harness() -> Arc<TransferCoordinator> {
    Arc::new(TransferCoordinator::new(Arc::new(MemoryStore::new())))
}

fn sweeper(coordinator: Arc<TransferCoordinator>) -> RecoverySweeper {
    RecoverySweeper::new(
        coordinator,
        SweeperConfig {
            scan_interval: Duration::from_millis(10),
            stale_threshold: Duration::from_millis(10),
            batch_size: 100,
        },
    )
}

#[tokio::test]
async fn transfer_scenario_walkthrough() {
    let coordinator = harness();
    let ledger = coordinator.ledger();

    ledger.create_account("acct-a", "Joe", 1000).await.unwrap();
    ledger.create_account("acct-b", "Paul", 1000).await.unwrap();

    // Clean transfer.
    let txn_id = coordinator
        .transfer(&TransferRequest::new("acct-a", "acct-b", 100))
        .await
        .unwrap();
    assert_eq!(
        coordinator.log().get(txn_id).await.unwrap().state,
        TxnState::Done
    );

    // Compensated transfer leaves no trace on the balances.
    let err = coordinator
        .transfer(&TransferRequest::new("acct-a", "acct-b", 100).with_fail(FailPoint::AfterApply))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::StorageUnavailable(_)));

    let a = ledger.account("acct-a").await.unwrap();
    let b = ledger.account("acct-b").await.unwrap();
    assert_eq!((a.balance, b.balance), (900, 1100));
    assert!(a.pending.is_empty() && b.pending.is_empty());
}

#[tokio::test]
async fn mixed_batch_converges_and_conserves_funds() {
    let coordinator = harness();
    let ledger = coordinator.ledger();

    let accounts = ["acct-a", "acct-b", "acct-c", "acct-d"];
    for id in accounts {
        ledger.create_account(id, id, 10_000).await.unwrap();
    }

    let faults = [
        None,
        Some(FailPoint::BeforeApply),
        Some(FailPoint::AfterFirstApply),
        Some(FailPoint::AfterApply),
        Some(FailPoint::AfterCommit),
    ];

    let mut tasks = Vec::new();
    for round in 0..20 {
        let coordinator = coordinator.clone();
        let source = accounts[round % 4].to_string();
        let destination = accounts[(round + 1) % 4].to_string();
        let fail = faults[round % faults.len()];
        tasks.push(tokio::spawn(async move {
            let mut request = TransferRequest::new(source, destination, 50 + round as i64);
            request.fail = fail;
            coordinator.transfer(&request).await
        }));
    }
    for task in tasks {
        // Individual outcomes vary; none may panic.
        let _ = task.await.unwrap();
    }

    // Sweep until quiescent.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let sweeper = sweeper(coordinator.clone());
    let mut passes = 0;
    while sweeper.sweep().await.unwrap() > 0 {
        passes += 1;
        assert!(passes < 10, "sweeps must converge");
    }

    // All transactions terminal.
    assert!(
        coordinator
            .log()
            .find_stale(Duration::ZERO)
            .await
            .unwrap()
            .is_empty()
    );

    // Funds conserved, no markers left behind.
    let mut total = 0;
    for id in accounts {
        let account = ledger.account(id).await.unwrap();
        assert!(account.pending.is_empty(), "{id} still has pending markers");
        total += account.balance;
    }
    assert_eq!(total, 40_000);
}

#[tokio::test]
async fn committed_balances_never_move_after_sweeps() {
    let coordinator = harness();
    let ledger = coordinator.ledger();

    ledger.create_account("acct-a", "Joe", 1000).await.unwrap();
    ledger.create_account("acct-b", "Paul", 1000).await.unwrap();

    let err = coordinator
        .transfer(&TransferRequest::new("acct-a", "acct-b", 400).with_fail(FailPoint::AfterCommit))
        .await
        .unwrap_err();
    let TransferError::CleanupPending(txn_id) = err else {
        panic!("expected CleanupPending, got {err:?}");
    };

    tokio::time::sleep(Duration::from_millis(25)).await;
    let sweeper = sweeper(coordinator.clone());
    for _ in 0..3 {
        sweeper.sweep().await.unwrap();
        assert_eq!(ledger.account("acct-a").await.unwrap().balance, 600);
        assert_eq!(ledger.account("acct-b").await.unwrap().balance, 1400);
    }
    assert_eq!(
        coordinator.log().get(txn_id).await.unwrap().state,
        TxnState::Done
    );
}
