//! Funds-Transfer Saga
//!
//! Application-level two-phase commit for moving money between two account
//! documents in a store whose only atomicity unit is a single record.
//!
//! # State Machine
//!
//! ```text
//! INITIAL → PENDING → APPLIED → COMMITTED → DONE
//!    ↓         ↓         ↓
//!    └──── CANCELED ─────┘
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Commit point is one-way**: failures before COMMITTED compensate to
//!    CANCELED; failures at or after COMMITTED resolve forward to DONE.
//! 2. **Idempotency**: every ledger operation is keyed to a transaction id
//!    via the per-account pending markers, so retries never double-apply.
//! 3. **Conditional transitions**: all state changes are guarded by the
//!    expected prior state, so a sweeper and a live coordinator racing the
//!    same transaction cannot both act.
//! 4. **No in-process coordination state**: everything needed to resume a
//!    transfer lives in its transaction document.

pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod log;
pub mod state;
pub mod sweeper;
pub mod types;


// Re-exports for convenience
pub use coordinator::TransferCoordinator;
pub use error::TransferError;
pub use ledger::AccountLedger;
pub use log::TransactionLog;
pub use state::TxnState;
pub use sweeper::{RecoverySweeper, SweeperConfig};
pub use types::{
    Account, FailPoint, PendingEntry, PendingRole, Transaction, TransactionId, TransferRequest,
};
