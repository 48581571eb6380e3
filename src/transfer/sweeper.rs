//! Recovery Sweeper
//!
//! Scans the transaction log for transfers stuck past a staleness
//! threshold and resumes them from persisted state: compensation for
//! anything that never passed the commit point, forward-only cleanup for
//! anything that did. Safe to run concurrently with live coordinators and
//! with other sweeps - conditional transitions are the only mutual
//! exclusion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::coordinator::TransferCoordinator;
use super::error::TransferError;

/// Configuration for the recovery sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to scan for stale transactions
    pub scan_interval: Duration,
    /// How long a transaction must sit in a non-terminal state to be
    /// considered stale
    pub stale_threshold: Duration,
    /// Maximum transactions to resume per pass
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// Recovery Sweeper
///
/// Repeated passes converge: every stale transaction ends in DONE or
/// CANCELED, and balances never change once a transaction is committed.
pub struct RecoverySweeper {
    coordinator: Arc<TransferCoordinator>,
    config: SweeperConfig,
}

impl RecoverySweeper {
    pub fn new(coordinator: Arc<TransferCoordinator>, config: SweeperConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn with_defaults(coordinator: Arc<TransferCoordinator>) -> Self {
        Self::new(coordinator, SweeperConfig::default())
    }

    /// Run the sweep loop forever.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            "starting recovery sweeper"
        );

        loop {
            if let Err(e) = self.sweep().await {
                error!(error = %e, "recovery sweep failed");
            }
            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single sweep pass. Returns how many transactions advanced.
    pub async fn sweep(&self) -> Result<usize, TransferError> {
        let stale = self
            .coordinator
            .log()
            .find_stale(self.config.stale_threshold)
            .await?;

        if stale.is_empty() {
            debug!("no stale transactions");
            return Ok(0);
        }

        info!(count = stale.len(), "found stale transactions to resume");

        let mut advanced = 0;
        for txn in stale.iter().take(self.config.batch_size) {
            debug!(txn = %txn.id, state = %txn.state, "resuming transaction");

            match self.coordinator.resume(txn.id).await {
                Ok(new_state) => {
                    if new_state != txn.state {
                        info!(
                            txn = %txn.id,
                            old_state = %txn.state,
                            new_state = %new_state,
                            "transaction advanced"
                        );
                        advanced += 1;
                    }
                }
                Err(e) => {
                    error!(txn = %txn.id, error = %e, "failed to resume transaction");
                }
            }
        }

        if advanced > 0 {
            info!(count = advanced, "transactions advanced this sweep");
        }
        Ok(advanced)
    }
}
