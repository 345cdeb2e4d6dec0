//! Disputes over parcels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ParcelStatus;

/// What the dispute contests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeType {
    Ownership,
    Boundary,
    Inheritance,
    Usage,
}

/// Dispute workflow status. Moves strictly forward:
/// OPEN → IN_PROGRESS → RESOLVED → CLOSED, with OPEN → CLOSED permitted
/// for withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl DisputeStatus {
    /// An active dispute keeps its parcel IN_DISPUTE.
    pub fn is_active(&self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::InProgress)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisputeStatus::Open => "OPEN",
            DisputeStatus::InProgress => "IN_PROGRESS",
            DisputeStatus::Resolved => "RESOLVED",
            DisputeStatus::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

/// An open contest over a parcel's ownership, boundary or usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_id: Uuid,
    pub parcel_id: Uuid,
    pub complainant: Uuid,
    pub defendant: Option<Uuid>,
    pub kind: DisputeType,
    pub description: String,
    pub status: DisputeStatus,
    pub assigned_agent: Option<Uuid>,
    /// Parcel status recorded at open time and restored when the last
    /// active dispute on the parcel clears. Never IN_DISPUTE: a dispute
    /// opened on an already-disputed parcel copies the true pre-dispute
    /// status from the earliest active dispute.
    pub previous_parcel_status: ParcelStatus,
    /// Set on RESOLVED/CLOSED only.
    pub resolution: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
