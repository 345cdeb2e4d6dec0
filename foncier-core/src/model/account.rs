//! Accounts: users and the citizen/agent records that extend them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Agent,
    Citizen,
}

/// Account lifecycle status. Only ACTIVE accounts may act on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
    Rejected,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Pending => "PENDING",
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// A user account. Credential material lives with the (external)
/// authentication layer, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// A citizen: may own parcels and be party to transactions and disputes.
/// Extends a [`User`] 1:1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citizen {
    pub citizen_id: Uuid,
    pub user_id: Uuid,
    pub national_id: String,
    pub phone: Option<String>,
}

/// Working status of an agent, independent of the account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    Inactive,
    Suspended,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Active => "ACTIVE",
            AgentStatus::Inactive => "INACTIVE",
            AgentStatus::Suspended => "SUSPENDED",
        };
        write!(f, "{s}")
    }
}

/// A land agent: authorized to validate transactions and handle disputes.
/// Extends a [`User`] 1:1. Only ACTIVE agents may validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: Uuid,
    pub user_id: Uuid,
    pub registration_number: String,
    pub region_code: String,
    pub status: AgentStatus,
}

impl Agent {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
