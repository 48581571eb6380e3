//! Account Ledger
//!
//! Owns balances and per-account pending-transfer markers. One operation
//! per protocol step; every operation is a single conditional update on
//! one account document, keyed to a transaction id so it is idempotent and
//! safe to retry from any actor (coordinator or sweeper).

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::store::{Document, RecordStore};

use super::error::TransferError;
use super::types::{Account, PendingRole, TransactionId};

/// Collection holding account documents
pub const ACCOUNTS: &str = "accounts";

/// Ledger operations over the account collection
pub struct AccountLedger {
    store: Arc<dyn RecordStore>,
}

impl AccountLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create an account with an initial balance and no pending markers.
    pub async fn create_account(
        &self,
        id: &str,
        name: &str,
        initial_balance: i64,
    ) -> Result<(), TransferError> {
        let account = Account::new(id, name, initial_balance);
        let doc = serde_json::to_value(&account)
            .map_err(|e| TransferError::Internal(e.to_string()))?;
        self.store.insert(ACCOUNTS, id, doc).await?;
        debug!(account = id, balance = initial_balance, "account created");
        Ok(())
    }

    /// Reload an account document.
    pub async fn account(&self, id: &str) -> Result<Account, TransferError> {
        match self.store.get(ACCOUNTS, id).await? {
            Some(doc) => decode_account(doc),
            None => Err(TransferError::AccountNotFound(id.to_string())),
        }
    }

    /// Subtract `amount` from the balance and record a source pending
    /// marker for `txn_id`. No-op if the marker already exists (already
    /// applied - safe to retry).
    pub async fn apply_debit(
        &self,
        account_id: &str,
        txn_id: TransactionId,
        amount: i64,
    ) -> Result<(), TransferError> {
        self.apply(account_id, txn_id, PendingRole::Source, -amount, amount)
            .await
    }

    /// Add `amount` to the balance and record a destination pending marker
    /// for `txn_id`. No-op if the marker already exists.
    pub async fn apply_credit(
        &self,
        account_id: &str,
        txn_id: TransactionId,
        amount: i64,
    ) -> Result<(), TransferError> {
        self.apply(account_id, txn_id, PendingRole::Destination, amount, amount)
            .await
    }

    async fn apply(
        &self,
        account_id: &str,
        txn_id: TransactionId,
        role: PendingRole,
        balance_delta: i64,
        amount: i64,
    ) -> Result<(), TransferError> {
        let key = txn_id.to_string();
        let matched = {
            let pred_key = key.clone();
            let mut_key = key.clone();
            self.store
                .conditional_update(
                    ACCOUNTS,
                    account_id,
                    Box::new(move |doc| !has_marker(doc, &pred_key)),
                    Box::new(move |doc| {
                        add_balance(doc, balance_delta);
                        push_marker(doc, &mut_key, role, amount);
                    }),
                )
                .await?
        };

        if matched {
            debug!(account = account_id, txn = %txn_id, role = %role, amount, "applied");
            return Ok(());
        }

        // Predicate missed: either the account is gone or the marker is
        // already there from an earlier attempt.
        match self.store.get(ACCOUNTS, account_id).await? {
            None => Err(TransferError::AccountNotFound(account_id.to_string())),
            Some(doc) if has_marker(&doc, &key) => {
                debug!(account = account_id, txn = %txn_id, "already applied, skipping");
                Ok(())
            }
            Some(_) => Err(TransferError::LedgerConflict(format!(
                "apply on {account_id} for {txn_id} matched nothing"
            ))),
        }
    }

    /// Remove the pending marker for `txn_id`, leaving the balance as is.
    /// No-op if the marker is absent (idempotent for retries mid-clear).
    pub async fn clear_pending(
        &self,
        account_id: &str,
        txn_id: TransactionId,
    ) -> Result<(), TransferError> {
        let key = txn_id.to_string();
        let matched = {
            let pred_key = key.clone();
            let mut_key = key.clone();
            self.store
                .conditional_update(
                    ACCOUNTS,
                    account_id,
                    Box::new(move |doc| has_marker(doc, &pred_key)),
                    Box::new(move |doc| {
                        remove_marker(doc, &mut_key);
                    }),
                )
                .await?
        };

        if matched {
            debug!(account = account_id, txn = %txn_id, "pending cleared");
            return Ok(());
        }

        match self.store.get(ACCOUNTS, account_id).await? {
            None => Err(TransferError::AccountNotFound(account_id.to_string())),
            // Never applied, or already cleared: either way the marker is
            // gone, which is all a retry needs.
            Some(_) => Ok(()),
        }
    }

    /// Reverse the balance effect recorded by the pending marker for
    /// `txn_id` and remove the marker. No-op if absent (never applied, or
    /// already cleared - the coordinator never rolls back after clearing).
    pub async fn rollback_pending(
        &self,
        account_id: &str,
        txn_id: TransactionId,
    ) -> Result<(), TransferError> {
        let key = txn_id.to_string();
        let matched = {
            let pred_key = key.clone();
            let mut_key = key.clone();
            self.store
                .conditional_update(
                    ACCOUNTS,
                    account_id,
                    Box::new(move |doc| has_marker(doc, &pred_key)),
                    Box::new(move |doc| {
                        if let Some((role, amount)) = remove_marker(doc, &mut_key) {
                            let delta = match role {
                                PendingRole::Source => amount,
                                PendingRole::Destination => -amount,
                            };
                            add_balance(doc, delta);
                        }
                    }),
                )
                .await?
        };

        if matched {
            debug!(account = account_id, txn = %txn_id, "pending rolled back");
            return Ok(());
        }

        match self.store.get(ACCOUNTS, account_id).await? {
            None => Err(TransferError::AccountNotFound(account_id.to_string())),
            Some(_) => Ok(()),
        }
    }
}

fn decode_account(doc: Document) -> Result<Account, TransferError> {
    serde_json::from_value(doc)
        .map_err(|e| TransferError::Internal(format!("corrupt account document: {e}")))
}

fn has_marker(doc: &Document, txn: &str) -> bool {
    doc.get("pending")
        .and_then(Document::as_array)
        .is_some_and(|entries| {
            entries
                .iter()
                .any(|e| e.get("txn_id").and_then(Document::as_str) == Some(txn))
        })
}

fn add_balance(doc: &mut Document, delta: i64) {
    let balance = doc.get("balance").and_then(Document::as_i64).unwrap_or(0);
    doc["balance"] = json!(balance + delta);
}

fn push_marker(doc: &mut Document, txn: &str, role: PendingRole, amount: i64) {
    let entry = json!({"txn_id": txn, "role": role.as_str(), "amount": amount});
    if !doc["pending"].is_array() {
        doc["pending"] = json!([]);
    }
    if let Some(entries) = doc["pending"].as_array_mut() {
        entries.push(entry);
    }
}

/// Remove the marker for `txn` and return its `(role, amount)` if present.
fn remove_marker(doc: &mut Document, txn: &str) -> Option<(PendingRole, i64)> {
    let entries = doc.get_mut("pending").and_then(Document::as_array_mut)?;
    let idx = entries
        .iter()
        .position(|e| e.get("txn_id").and_then(Document::as_str) == Some(txn))?;
    let entry = entries.remove(idx);

    let role = match entry.get("role").and_then(Document::as_str) {
        Some("destination") => PendingRole::Destination,
        _ => PendingRole::Source,
    };
    let amount = entry.get("amount").and_then(Document::as_i64).unwrap_or(0);
    Some((role, amount))
}
