//! docledger demo driver
//!
//! Small load scenario against the in-memory store: seed a handful of
//! accounts, fire a batch of concurrent transfers with a few injected
//! faults mixed in, then run a recovery sweep and verify that the books
//! still balance.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info};

use docledger::config::AppConfig;
use docledger::logging::init_logging;
use docledger::store::MemoryStore;
use docledger::transfer::{
    FailPoint, RecoverySweeper, SweeperConfig, TransferCoordinator, TransferError, TransferRequest,
};

const ACCOUNTS: usize = 8;
const INITIAL_BALANCE: i64 = 100_000;
const TRANSFERS: usize = 64;

fn account_id(n: usize) -> String {
    format!("acct-{n:03}")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load_or_default("config/docledger.yaml");
    let _guard = init_logging(&config);

    info!(git = env!("GIT_HASH"), "docledger demo starting");

    let coordinator = Arc::new(TransferCoordinator::new(Arc::new(MemoryStore::new())));

    for n in 0..ACCOUNTS {
        coordinator
            .ledger()
            .create_account(&account_id(n), &format!("Account {n}"), INITIAL_BALANCE)
            .await?;
    }
    info!(count = ACCOUNTS, balance = INITIAL_BALANCE, "accounts seeded");

    let mut tasks = Vec::with_capacity(TRANSFERS);
    for n in 0..TRANSFERS {
        let coordinator = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            let (source, destination, amount) = {
                let mut rng = rand::thread_rng();
                let a = rng.gen_range(0..ACCOUNTS);
                let b = (a + rng.gen_range(1..ACCOUNTS)) % ACCOUNTS;
                (account_id(a), account_id(b), rng.gen_range(1..500))
            };

            // Every 16th transfer trips a fault somewhere in the protocol.
            let mut request = TransferRequest::new(source, destination, amount);
            request.fail = match n % 16 {
                13 => Some(FailPoint::AfterFirstApply),
                14 => Some(FailPoint::AfterApply),
                15 => Some(FailPoint::AfterCommit),
                _ => None,
            };

            coordinator.transfer(&request).await
        }));
    }

    let mut done = 0usize;
    let mut canceled = 0usize;
    let mut deferred = 0usize;
    for task in tasks {
        match task.await? {
            Ok(_) => done += 1,
            Err(TransferError::CleanupPending(txn)) => {
                info!(%txn, "committed with cleanup deferred");
                deferred += 1;
            }
            Err(e) => {
                info!(error = %e, code = e.code(), "transfer rolled back");
                canceled += 1;
            }
        }
    }
    info!(done, canceled, deferred, "transfer batch finished");

    // One sweep pass retires whatever the injected faults left behind.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sweeper = RecoverySweeper::new(
        coordinator.clone(),
        SweeperConfig {
            stale_threshold: Duration::from_millis(10),
            ..config.sweeper.to_sweeper_config()
        },
    );
    let advanced = sweeper.sweep().await?;
    info!(advanced, "recovery sweep finished");

    // The books must balance: transfers and compensations conserve funds.
    let mut total = 0i64;
    for n in 0..ACCOUNTS {
        let account = coordinator.ledger().account(&account_id(n)).await?;
        info!(
            account = %account.id,
            balance = account.balance,
            pending = account.pending.len(),
            "final balance"
        );
        total += account.balance;
    }

    let expected = INITIAL_BALANCE * ACCOUNTS as i64;
    if total == expected {
        info!(total, "funds conserved");
    } else {
        error!(total, expected, "funds NOT conserved");
    }

    Ok(())
}
