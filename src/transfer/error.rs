//! Transfer Error Types

use thiserror::Error;

use crate::store::StoreError;

use super::types::TransactionId;

/// Transfer error taxonomy
///
/// Failures before the commit point are recovered locally (compensate,
/// cancel, report). Failures at or after it are never surfaced as failures
/// of the funds movement itself; only [`TransferError::CleanupPending`]
/// reports that clearing was deferred.
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Validation ===
    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("insufficient funds on {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: String,
        balance: i64,
        requested: i64,
    },

    // === Missing records ===
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    // === Transient ===
    #[error("ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    // === Post-commit ===
    #[error("transfer {0} committed; pending markers left for recovery")]
    CleanupPending(TransactionId),

    // === System ===
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Stable error code for logs and caller dispatch
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidTransfer(_) => "INVALID_TRANSFER",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            TransferError::LedgerConflict(_) => "LEDGER_CONFLICT",
            TransferError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            TransferError::CleanupPending(_) => "CLEANUP_PENDING",
            TransferError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the same call may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::LedgerConflict(_) | TransferError::StorageUnavailable(_)
        )
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => TransferError::StorageUnavailable(msg),
            StoreError::DuplicateKey { collection, id } => {
                TransferError::LedgerConflict(format!("duplicate key {collection}/{id}"))
            }
        }
    }
}
