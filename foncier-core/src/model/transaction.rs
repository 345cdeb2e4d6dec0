//! Ownership transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Nature of an ownership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Sale,
    Purchase,
    Transfer,
    Inheritance,
    Donation,
    Exchange,
}

/// Transaction workflow status. PENDING is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// A proposed, then validated/rejected/cancelled change of parcel ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub parcel_id: Uuid,
    pub kind: TransactionType,
    /// Owner being replaced. None when state land is first attributed.
    pub previous_owner: Option<Uuid>,
    pub new_owner: Uuid,
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// User who proposed the transaction; may cancel it while PENDING.
    pub proposed_by: Uuid,
    pub proposed_at: DateTime<Utc>,
    /// Agent who approved or rejected. Never set on CANCELLED.
    pub validating_agent: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    /// Registry act number, assigned on approval from the monotonic
    /// sequence. A consumed number is never reassigned.
    pub act_number: Option<u64>,
    /// Reason recorded on rejection.
    pub decision_reason: Option<String>,
}
