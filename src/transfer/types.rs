//! Transfer Core Types
//!
//! Account and transaction documents plus the request/fault types used to
//! drive the saga.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::state::TxnState;

/// Transaction ID - ULID-based unique identifier
///
/// ULIDs are monotonic, sortable and need no coordination between
/// coordinator instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    /// Generate a new unique TransactionId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Which side of a transfer a pending marker belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingRole {
    Source,
    Destination,
}

impl PendingRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingRole::Source => "source",
            PendingRole::Destination => "destination",
        }
    }
}

impl fmt::Display for PendingRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-account record of an in-flight transaction's effect.
///
/// Its presence means the balance effect for `txn_id` has been applied on
/// this account but not yet cleared; it is what makes every ledger
/// operation idempotent per transaction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub txn_id: TransactionId,
    pub role: PendingRole,
    pub amount: i64,
}

/// Account document (collection `accounts`)
///
/// `balance` is in minor currency units and reflects every transaction
/// whose effect on this account has been applied, terminal or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub balance: i64,
    pub pending: Vec<PendingEntry>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>, balance: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            balance,
            pending: Vec::new(),
        }
    }

    /// Look up the pending marker for a transaction, if applied here.
    pub fn pending_for(&self, txn_id: TransactionId) -> Option<&PendingEntry> {
        self.pending.iter().find(|e| e.txn_id == txn_id)
    }
}

/// Transaction document (collection `transactions`)
///
/// The single source of truth for whether a transfer has been decided.
/// Retained after completion as an audit/recovery log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub source: String,
    pub destination: String,
    pub amount: i64,
    pub state: TxnState,
    /// Epoch millis
    pub created_at: i64,
    /// Epoch millis, stamped on every state transition
    pub last_transition_at: i64,
}

impl Transaction {
    /// Create a new transaction record in INITIAL state
    pub fn new(source: impl Into<String>, destination: impl Into<String>, amount: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: TransactionId::new(),
            source: source.into(),
            destination: destination.into(),
            amount,
            state: TxnState::Initial,
            created_at: now,
            last_transition_at: now,
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Txn[{}] {} -> {} amount={} state={}",
            self.id, self.source, self.destination, self.amount, self.state
        )
    }
}

/// Protocol step at which a fault is injected.
///
/// Each point simulates the storage call at that step failing after (or
/// before) its effect landed; tests and the load driver use these to
/// exercise every compensation and recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Intent recorded, nothing applied yet
    BeforeApply,
    /// Debit applied to the source, credit not yet attempted
    AfterFirstApply,
    /// Both sides applied, decision not yet durable
    AfterApply,
    /// Decision durable, pending markers not yet cleared
    AfterCommit,
}

impl FailPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailPoint::BeforeApply => "failBeforeApply",
            FailPoint::AfterFirstApply => "failAfterFirstApply",
            FailPoint::AfterApply => "failAfterApply",
            FailPoint::AfterCommit => "failAfterCommit",
        }
    }
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transfer request handed to the coordinator
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source account id
    pub source: String,
    /// Destination account id
    pub destination: String,
    /// Amount in minor currency units, must be positive
    pub amount: i64,
    /// Optional injected fault, used by tests and the load driver
    pub fail: Option<FailPoint>,
}

impl TransferRequest {
    /// Create a new transfer request
    pub fn new(source: impl Into<String>, destination: impl Into<String>, amount: i64) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            amount,
            fail: None,
        }
    }

    /// Inject a fault at the given protocol step
    pub fn with_fail(mut self, point: FailPoint) -> Self {
        self.fail = Some(point);
        self
    }
}
