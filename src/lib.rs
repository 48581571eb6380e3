//! docledger - funds-transfer saga over a document record store
//!
//! Moves money between two account documents without a multi-record
//! transaction primitive, using an application-level two-phase commit with
//! a hard commit point. The backing store only has to provide atomic
//! conditional updates per single record.
//!
//! # Modules
//!
//! - [`store`] - the record-store contract and an in-memory implementation
//! - [`transfer`] - transaction log, account ledger, coordinator, sweeper
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod logging;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use store::{MemoryStore, RecordStore, StoreError};
pub use transfer::{
    Account, AccountLedger, FailPoint, PendingEntry, PendingRole, RecoverySweeper, SweeperConfig,
    Transaction, TransactionId, TransactionLog, TransferCoordinator, TransferError,
    TransferRequest, TxnState,
};
