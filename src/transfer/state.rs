//! Transfer Saga State Definitions
//!
//! States are serialized lowercase into the transaction document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transaction saga states
///
/// Terminal states: DONE, CANCELED. COMMITTED is the one-way gate: once a
/// transaction reaches it, the only legal continuation is forward to DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnState {
    /// Record created, no intent recorded yet
    Initial,

    /// Intent recorded - account mutations may be in flight
    Pending,

    /// Both debit and credit landed, decision not yet durable
    Applied,

    /// Decision point passed - the transfer is economically final,
    /// only pending-marker cleanup remains
    Committed,

    /// Terminal: cleared on both accounts
    Done,

    /// Terminal: compensated (or never applied)
    Canceled,
}

impl TxnState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnState::Done | TxnState::Canceled)
    }

    /// Check if the commit point has been passed. Past it, compensation is
    /// forbidden; recovery must only move forward.
    #[inline]
    pub fn past_commit_point(&self) -> bool {
        matches!(self, TxnState::Committed | TxnState::Done)
    }

    /// State name as stored in the transaction document
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnState::Initial => "initial",
            TxnState::Pending => "pending",
            TxnState::Applied => "applied",
            TxnState::Committed => "committed",
            TxnState::Done => "done",
            TxnState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxnState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(TxnState::Initial),
            "pending" => Ok(TxnState::Pending),
            "applied" => Ok(TxnState::Applied),
            "committed" => Ok(TxnState::Committed),
            "done" => Ok(TxnState::Done),
            "canceled" => Ok(TxnState::Canceled),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TxnState::Done.is_terminal());
        assert!(TxnState::Canceled.is_terminal());

        assert!(!TxnState::Initial.is_terminal());
        assert!(!TxnState::Pending.is_terminal());
        assert!(!TxnState::Applied.is_terminal());
        assert!(!TxnState::Committed.is_terminal());
    }

    #[test]
    fn test_commit_point() {
        assert!(TxnState::Committed.past_commit_point());
        assert!(TxnState::Done.past_commit_point());

        assert!(!TxnState::Initial.past_commit_point());
        assert!(!TxnState::Pending.past_commit_point());
        assert!(!TxnState::Applied.past_commit_point());
        assert!(!TxnState::Canceled.past_commit_point());
    }

    #[test]
    fn test_name_roundtrip() {
        let states = [
            TxnState::Initial,
            TxnState::Pending,
            TxnState::Applied,
            TxnState::Committed,
            TxnState::Done,
            TxnState::Canceled,
        ];

        for state in states {
            let recovered: TxnState = state.as_str().parse().unwrap();
            assert_eq!(state, recovered);
        }
        assert!("bogus".parse::<TxnState>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&TxnState::Committed).unwrap();
        assert_eq!(json, "\"committed\"");

        let state: TxnState = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(state, TxnState::Canceled);
    }
}
