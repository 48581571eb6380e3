//! Transaction Log
//!
//! Durable record of each transfer's protocol state; the single source of
//! truth for whether a transfer has been decided. All state changes go
//! through [`TransactionLog::transition`], a conditional update guarded by
//! the expected prior state, which is what lets a sweeper and a live
//! coordinator race the same transaction safely.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::store::{Document, RecordStore};

use super::error::TransferError;
use super::state::TxnState;
use super::types::{Transaction, TransactionId};

/// Collection holding transaction documents
pub const TRANSACTIONS: &str = "transactions";

/// Log operations over the transaction collection
pub struct TransactionLog {
    store: Arc<dyn RecordStore>,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Record a new transfer in INITIAL state.
    ///
    /// Rejects same-account and non-positive transfers before anything is
    /// written.
    pub async fn create(
        &self,
        source: &str,
        destination: &str,
        amount: i64,
    ) -> Result<Transaction, TransferError> {
        if source == destination {
            return Err(TransferError::InvalidTransfer(
                "source and destination are the same account".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(TransferError::InvalidTransfer(format!(
                "amount must be positive, got {amount}"
            )));
        }

        let txn = Transaction::new(source, destination, amount);
        let doc =
            serde_json::to_value(&txn).map_err(|e| TransferError::Internal(e.to_string()))?;
        self.store
            .insert(TRANSACTIONS, &txn.id.to_string(), doc)
            .await?;
        Ok(txn)
    }

    /// Fetch a transaction record.
    pub async fn get(&self, txn_id: TransactionId) -> Result<Transaction, TransferError> {
        match self.store.get(TRANSACTIONS, &txn_id.to_string()).await? {
            Some(doc) => decode_txn(doc),
            None => Err(TransferError::TransactionNotFound(txn_id.to_string())),
        }
    }

    /// Conditional state transition.
    ///
    /// Succeeds (and stamps `last_transition_at`) only if the stored state
    /// equals `from`. Returns false without touching the record otherwise:
    /// some other actor won the transition, and the caller must stop.
    pub async fn transition(
        &self,
        txn_id: TransactionId,
        from: TxnState,
        to: TxnState,
    ) -> Result<bool, TransferError> {
        let matched = self
            .store
            .conditional_update(
                TRANSACTIONS,
                &txn_id.to_string(),
                Box::new(move |doc| {
                    doc.get("state").and_then(Document::as_str) == Some(from.as_str())
                }),
                Box::new(move |doc| {
                    doc["state"] = json!(to.as_str());
                    doc["last_transition_at"] = json!(chrono::Utc::now().timestamp_millis());
                }),
            )
            .await?;

        if matched {
            debug!(txn = %txn_id, %from, %to, "state transition");
        } else {
            debug!(txn = %txn_id, %from, %to, "transition lost, state moved concurrently");
        }
        Ok(matched)
    }

    /// Non-terminal transactions whose last transition is older than
    /// `threshold`, oldest first.
    pub async fn find_stale(
        &self,
        threshold: Duration,
    ) -> Result<Vec<Transaction>, TransferError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - threshold.as_millis() as i64;

        let mut stale = Vec::new();
        for doc in self.store.scan(TRANSACTIONS).await? {
            let txn = decode_txn(doc)?;
            if !txn.state.is_terminal() && txn.last_transition_at < cutoff {
                stale.push(txn);
            }
        }
        stale.sort_by_key(|txn| txn.last_transition_at);
        Ok(stale)
    }
}

fn decode_txn(doc: Document) -> Result<Transaction, TransferError> {
    serde_json::from_value(doc)
        .map_err(|e| TransferError::Internal(format!("corrupt transaction document: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn log() -> TransactionLog {
        TransactionLog::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_validates() {
        let log = log();

        let err = log.create("acct-a", "acct-a", 100).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransfer(_)));

        let err = log.create("acct-a", "acct-b", 0).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransfer(_)));

        let err = log.create("acct-a", "acct-b", -5).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransfer(_)));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let log = log();
        let txn = log.create("acct-a", "acct-b", 100).await.unwrap();
        assert_eq!(txn.state, TxnState::Initial);

        let loaded = log.get(txn.id).await.unwrap();
        assert_eq!(loaded.source, "acct-a");
        assert_eq!(loaded.destination, "acct-b");
        assert_eq!(loaded.amount, 100);

        let err = log.get(TransactionId::new()).await.unwrap_err();
        assert!(matches!(err, TransferError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn test_transition_cas() {
        let log = log();
        let txn = log.create("acct-a", "acct-b", 100).await.unwrap();

        assert!(
            log.transition(txn.id, TxnState::Initial, TxnState::Pending)
                .await
                .unwrap()
        );
        // Same transition again: expected state no longer matches.
        assert!(
            !log.transition(txn.id, TxnState::Initial, TxnState::Pending)
                .await
                .unwrap()
        );
        assert_eq!(log.get(txn.id).await.unwrap().state, TxnState::Pending);
    }

    #[tokio::test]
    async fn test_transition_stamps_time() {
        let log = log();
        let txn = log.create("acct-a", "acct-b", 100).await.unwrap();
        let before = log.get(txn.id).await.unwrap().last_transition_at;

        tokio::time::sleep(Duration::from_millis(5)).await;
        log.transition(txn.id, TxnState::Initial, TxnState::Pending)
            .await
            .unwrap();

        let after = log.get(txn.id).await.unwrap().last_transition_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_transition_on_missing_txn_is_false() {
        let log = log();
        assert!(
            !log.transition(TransactionId::new(), TxnState::Initial, TxnState::Pending)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_find_stale_skips_terminal_and_fresh() {
        let log = log();

        let stuck = log.create("acct-a", "acct-b", 100).await.unwrap();
        log.transition(stuck.id, TxnState::Initial, TxnState::Pending)
            .await
            .unwrap();

        let finished = log.create("acct-a", "acct-b", 100).await.unwrap();
        log.transition(finished.id, TxnState::Initial, TxnState::Canceled)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        // A transaction transitioned after the sleep is fresh.
        let fresh = log.create("acct-a", "acct-b", 100).await.unwrap();
        log.transition(fresh.id, TxnState::Initial, TxnState::Pending)
            .await
            .unwrap();

        let stale = log.find_stale(Duration::from_millis(10)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, stuck.id);
    }

    #[tokio::test]
    async fn test_find_stale_oldest_first() {
        let log = log();
        let first = log.create("acct-a", "acct-b", 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = log.create("acct-a", "acct-b", 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stale = log.find_stale(Duration::from_millis(10)).await.unwrap();
        assert_eq!(stale.len(), 2);
        assert_eq!(stale[0].id, first.id);
        assert_eq!(stale[1].id, second.id);
    }
}
