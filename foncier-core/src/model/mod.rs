//! Entity Model
//!
//! Typed representations of everything the registry records: reference data
//! (regions), accounts (users, citizens, agents), parcels and the
//! transactions and disputes that change them, plus the supporting rows
//! (documents, notifications, audit entries).
//!
//! Status enums serialize as the SCREAMING_SNAKE_CASE strings the registry
//! stores, so a row round-trips unchanged through any backend.

mod account;
mod audit;
mod dispute;
mod document;
mod parcel;
mod region;
mod transaction;

pub use account::{AccountStatus, Agent, AgentStatus, Citizen, User, UserRole};
pub use audit::AuditEntry;
pub use dispute::{Dispute, DisputeStatus, DisputeType};
pub use document::{Document, DocumentKind, Notification};
pub use parcel::{LandType, Parcel, ParcelStatus};
pub use region::Region;
pub use transaction::{Transaction, TransactionStatus, TransactionType};

use std::fmt;

use serde::{Deserialize, Serialize};

/// The entity kinds the store manages. Used in audit entries, error
/// messages and document ownership references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Region,
    User,
    Citizen,
    Agent,
    Parcel,
    Transaction,
    Dispute,
    Document,
    Notification,
    AuditEntry,
    Sequence,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Region => "region",
            EntityKind::User => "user",
            EntityKind::Citizen => "citizen",
            EntityKind::Agent => "agent",
            EntityKind::Parcel => "parcel",
            EntityKind::Transaction => "transaction",
            EntityKind::Dispute => "dispute",
            EntityKind::Document => "document",
            EntityKind::Notification => "notification",
            EntityKind::AuditEntry => "audit entry",
            EntityKind::Sequence => "sequence",
        };
        write!(f, "{name}")
    }
}
