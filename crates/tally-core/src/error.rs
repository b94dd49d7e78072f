//! Error types for Tally reconciliation

use crate::types::{AccountId, GroupId, MemberId};
use thiserror::Error;

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

/// Errors that can occur while reconciling a block range
///
/// Reconciliation mismatches are deliberately absent: divergence between
/// computed and on-chain totals is a finding, reported as a diagnostic in
/// the report rather than raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    // === Collaborator reads ===
    /// Storage or indexer unreachable, or returned something malformed
    #[error("Chain read failed for {what}: {reason}")]
    ChainRead { what: String, reason: String },

    // === Caller input ===
    /// Block or era range rejected before computation starts
    #[error("Inconsistent range: {0}")]
    InconsistentRange(String),

    /// Out-of-domain parameter (percentile, term length, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Group not tracked by the ledger
    #[error("Unknown group: {0}")]
    UnknownGroup(GroupId),

    // === Classification ===
    /// An address resolves to more than one member
    #[error("Account {account} resolves to multiple members: {members:?}")]
    ClassificationAmbiguity {
        account: AccountId,
        members: Vec<MemberId>,
    },

    // === Arithmetic ===
    /// Integer overflow in balance arithmetic
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Report structure could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Fixtures ===
    /// Offline chain fixture could not be loaded
    #[error("Fixture error: {0}")]
    Fixture(String),
}

impl TallyError {
    /// Shorthand for a failed collaborator read
    pub fn chain_read(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChainRead {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Stable numeric code for report consumers
    pub fn code(&self) -> u32 {
        match self {
            Self::ChainRead { .. } => 2001,
            Self::InconsistentRange(_) => 2002,
            Self::InvalidParameter(_) => 2003,
            Self::UnknownGroup(_) => 2004,
            Self::ClassificationAmbiguity { .. } => 2005,
            Self::Overflow(_) => 2006,
            Self::Serialization(_) => 2007,
            Self::Fixture(_) => 9999,
        }
    }

    /// Check if retrying the same read could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainRead { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TallyError::chain_read("era 4", "timeout").code(), 2001);
        assert_eq!(TallyError::InconsistentRange("start > end".into()).code(), 2002);
    }

    #[test]
    fn test_error_display() {
        let err = TallyError::chain_read("erasStakers(12)", "connection reset");
        let msg = format!("{}", err);
        assert!(msg.contains("erasStakers(12)"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TallyError::chain_read("bonded", "timeout").is_retryable());
        assert!(!TallyError::InconsistentRange("empty".into()).is_retryable());
        assert!(!TallyError::UnknownGroup(GroupId::from("x")).is_retryable());
    }
}
