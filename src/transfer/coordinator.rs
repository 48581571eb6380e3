//! Transfer Coordinator
//!
//! Drives one transfer through the saga state machine, calling the ledger
//! and the transaction log in a fixed order. Every failure observed while
//! the transaction is at or below APPLIED is compensated and canceled;
//! every failure observed at or past COMMITTED resolves forward only.
//!
//! ```text
//! INITIAL → PENDING → APPLIED → COMMITTED → DONE
//!    ↓         ↓         ↓
//!    └──── CANCELED ─────┘        (compensation, pre-commit only)
//! ```
//!
//! All coordination state lives in the transaction document itself, so any
//! coordinator instance or sweeper can resume a transfer from its persisted
//! state; conditional transitions ensure only one actor wins each step.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::store::RecordStore;

use super::error::TransferError;
use super::ledger::AccountLedger;
use super::log::TransactionLog;
use super::state::TxnState;
use super::types::{FailPoint, TransactionId, TransferRequest};

/// Transfer Coordinator - owns the saga state machine
pub struct TransferCoordinator {
    ledger: AccountLedger,
    log: TransactionLog,
}

impl TransferCoordinator {
    /// Create a coordinator over the given record store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            ledger: AccountLedger::new(store.clone()),
            log: TransactionLog::new(store),
        }
    }

    /// Account ledger, for account creation and inspection
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Transaction log, for inspection and recovery scans
    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    /// Move `request.amount` from source to destination.
    ///
    /// On success the transaction is DONE and both pending markers are
    /// cleared. Pre-commit failures are compensated to CANCELED and the
    /// step's error returned. Post-commit failures return
    /// [`TransferError::CleanupPending`]: the movement is final and only
    /// marker cleanup is outstanding, which the sweeper finishes.
    pub async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransactionId, TransferError> {
        let txn = self
            .log
            .create(&request.source, &request.destination, request.amount)
            .await?;
        let txn_id = txn.id;
        info!(
            txn = %txn_id,
            source = %request.source,
            destination = %request.destination,
            amount = request.amount,
            "transfer created"
        );

        // Both accounts must exist and the source must cover the amount
        // before any intent is recorded. The balance check is defensive:
        // applies themselves do not re-check it.
        if let Err(e) = self.check_funds(request).await {
            self.abort(txn_id, &e).await;
            return Err(e);
        }

        if let Err(e) = self.drive_to_commit(txn_id, request).await {
            self.abort(txn_id, &e).await;
            return Err(e);
        }

        // Past the commit point: never compensate, only report deferred
        // cleanup.
        if let Err(e) = self.trip(request, FailPoint::AfterCommit) {
            warn!(txn = %txn_id, error = %e, "cleanup failed past commit point, leaving for sweep");
            return Err(TransferError::CleanupPending(txn_id));
        }
        if let Err(e) = self.finish(txn_id, &request.source, &request.destination).await {
            warn!(txn = %txn_id, error = %e, "cleanup failed past commit point, leaving for sweep");
            return Err(TransferError::CleanupPending(txn_id));
        }

        info!(txn = %txn_id, "transfer done");
        Ok(txn_id)
    }

    /// Resume a transfer from its persisted state.
    ///
    /// Used by the recovery sweeper, and safe to race with a live
    /// coordinator: every state change is a conditional transition, so only
    /// one actor wins and the other observes a lost transition and stops.
    /// Returns the state after this attempt.
    pub async fn resume(&self, txn_id: TransactionId) -> Result<TxnState, TransferError> {
        let txn = self.log.get(txn_id).await?;

        match txn.state {
            TxnState::Done | TxnState::Canceled => return Ok(txn.state),
            // The decision was never durably recorded: compensate.
            TxnState::Initial | TxnState::Pending | TxnState::Applied => {
                self.cancel(txn_id).await?;
            }
            // Decision is durable: forward only.
            TxnState::Committed => {
                self.finish(txn_id, &txn.source, &txn.destination).await?;
            }
        }

        Ok(self.log.get(txn_id).await?.state)
    }

    async fn check_funds(&self, request: &TransferRequest) -> Result<(), TransferError> {
        let source = self.ledger.account(&request.source).await?;
        self.ledger.account(&request.destination).await?;

        if source.balance < request.amount {
            return Err(TransferError::InsufficientFunds {
                account: request.source.clone(),
                balance: source.balance,
                requested: request.amount,
            });
        }
        Ok(())
    }

    /// Steps 2-5 of the protocol: record intent, apply both sides, mark
    /// applied, then pass the commit point.
    async fn drive_to_commit(
        &self,
        txn_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        if !self
            .log
            .transition(txn_id, TxnState::Initial, TxnState::Pending)
            .await?
        {
            return Err(TransferError::LedgerConflict(format!(
                "{txn_id} left INITIAL concurrently"
            )));
        }

        self.trip(request, FailPoint::BeforeApply)?;
        self.ledger
            .apply_debit(&request.source, txn_id, request.amount)
            .await?;

        self.trip(request, FailPoint::AfterFirstApply)?;
        self.ledger
            .apply_credit(&request.destination, txn_id, request.amount)
            .await?;

        if !self
            .log
            .transition(txn_id, TxnState::Pending, TxnState::Applied)
            .await?
        {
            return Err(TransferError::LedgerConflict(format!(
                "{txn_id} left PENDING concurrently"
            )));
        }

        self.trip(request, FailPoint::AfterApply)?;

        // The commit point. Once this lands the transfer is irrevocable.
        if !self
            .log
            .transition(txn_id, TxnState::Applied, TxnState::Committed)
            .await?
        {
            return Err(TransferError::LedgerConflict(format!(
                "{txn_id} left APPLIED concurrently"
            )));
        }

        Ok(())
    }

    /// Compensate a transfer that has not passed the commit point and
    /// cancel it. Rollbacks run in reverse order of application and are
    /// idempotent, so this is safe no matter how far the applies got and
    /// how many actors retry it.
    async fn cancel(&self, txn_id: TransactionId) -> Result<(), TransferError> {
        let txn = self.log.get(txn_id).await?;

        match txn.state {
            TxnState::Done | TxnState::Canceled => Ok(()),
            TxnState::Committed => {
                // One-way gate: a cancel request past the commit point is a
                // protocol violation by the caller, not a recovery path.
                warn!(txn = %txn_id, "cancel refused past commit point");
                Err(TransferError::LedgerConflict(format!(
                    "{txn_id} is committed and can only move forward"
                )))
            }
            TxnState::Initial => {
                // Nothing was ever applied.
                self.log
                    .transition(txn_id, TxnState::Initial, TxnState::Canceled)
                    .await?;
                info!(txn = %txn_id, "transfer canceled");
                Ok(())
            }
            from @ (TxnState::Pending | TxnState::Applied) => {
                self.ledger
                    .rollback_pending(&txn.destination, txn_id)
                    .await?;
                self.ledger.rollback_pending(&txn.source, txn_id).await?;

                if self.log.transition(txn_id, from, TxnState::Canceled).await? {
                    info!(txn = %txn_id, %from, "transfer compensated and canceled");
                } else {
                    debug!(txn = %txn_id, "cancel transition lost, another actor finished it");
                }
                Ok(())
            }
        }
    }

    /// Steps 6-7: clear both pending markers, then retire the transaction.
    async fn finish(
        &self,
        txn_id: TransactionId,
        source: &str,
        destination: &str,
    ) -> Result<(), TransferError> {
        self.ledger.clear_pending(source, txn_id).await?;
        self.ledger.clear_pending(destination, txn_id).await?;

        if !self
            .log
            .transition(txn_id, TxnState::Committed, TxnState::Done)
            .await?
        {
            debug!(txn = %txn_id, "finish transition lost, another actor retired it");
        }
        Ok(())
    }

    /// Best-effort compensation for a failed step; if it fails too, the
    /// transaction stays non-terminal and the sweep picks it up.
    async fn abort(&self, txn_id: TransactionId, cause: &TransferError) {
        warn!(
            txn = %txn_id,
            error = %cause,
            code = cause.code(),
            "transfer failed before commit point, compensating"
        );
        if let Err(e) = self.cancel(txn_id).await {
            warn!(txn = %txn_id, error = %e, "compensation failed, leaving for sweep");
        }
    }

    fn trip(&self, request: &TransferRequest, point: FailPoint) -> Result<(), TransferError> {
        match request.fail {
            Some(p) if p == point => Err(TransferError::StorageUnavailable(format!(
                "injected fault at {point}"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn coordinator() -> TransferCoordinator {
        TransferCoordinator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_record() {
        let coordinator = coordinator();

        let err = coordinator
            .transfer(&TransferRequest::new("acct-a", "acct-a", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransfer(_)));

        let err = coordinator
            .transfer(&TransferRequest::new("acct-a", "acct-b", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransfer(_)));
    }

    #[tokio::test]
    async fn test_missing_account_cancels() {
        let coordinator = coordinator();
        coordinator
            .ledger()
            .create_account("acct-a", "Joe", 1000)
            .await
            .unwrap();

        let err = coordinator
            .transfer(&TransferRequest::new("acct-a", "acct-b", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::AccountNotFound(_)));

        // The transaction record exists and was canceled without touching
        // the existing account.
        let stale = coordinator
            .log()
            .find_stale(std::time::Duration::ZERO)
            .await
            .unwrap();
        assert!(stale.is_empty());
        assert_eq!(
            coordinator.ledger().account("acct-a").await.unwrap().balance,
            1000
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_cancels() {
        let coordinator = coordinator();
        coordinator
            .ledger()
            .create_account("acct-a", "Joe", 50)
            .await
            .unwrap();
        coordinator
            .ledger()
            .create_account("acct-b", "Paul", 1000)
            .await
            .unwrap();

        let err = coordinator
            .transfer(&TransferRequest::new("acct-a", "acct-b", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { .. }));

        assert_eq!(
            coordinator.ledger().account("acct-a").await.unwrap().balance,
            50
        );
        assert_eq!(
            coordinator.ledger().account("acct-b").await.unwrap().balance,
            1000
        );
    }

    #[tokio::test]
    async fn test_cancel_refused_past_commit_point() {
        let coordinator = coordinator();
        coordinator
            .ledger()
            .create_account("acct-a", "Joe", 1000)
            .await
            .unwrap();
        coordinator
            .ledger()
            .create_account("acct-b", "Paul", 1000)
            .await
            .unwrap();

        let req =
            TransferRequest::new("acct-a", "acct-b", 100).with_fail(FailPoint::AfterCommit);
        let err = coordinator.transfer(&req).await.unwrap_err();
        let TransferError::CleanupPending(txn_id) = err else {
            panic!("expected CleanupPending, got {err:?}");
        };

        let err = coordinator.cancel(txn_id).await.unwrap_err();
        assert!(matches!(err, TransferError::LedgerConflict(_)));
        assert_eq!(
            coordinator.log().get(txn_id).await.unwrap().state,
            TxnState::Committed
        );
    }
}
