//! Storage port for the registry.
//!
//! The engines operate exclusively through [`RegistryStore`], enabling
//! pluggable backends ([`MemoryStore`](memory::MemoryStore) for tests and
//! demos, a database for production). Reads return [`Versioned`] rows; all
//! writes go through [`RegistryStore::commit`] as one atomic
//! [`UnitOfWork`], with the version observed at read time checked at
//! commit time. That commit-time check is what closes every
//! check-then-act race in the engines: there is no separate lock
//! acquisition step.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    Agent, AuditEntry, Citizen, Dispute, Document, EntityKind, Notification, Parcel, Region,
    Transaction, User,
};

/// A row paired with the optimistic-concurrency version observed when it
/// was loaded. Updates staged against the row carry this version and fail
/// the whole unit of work if the stored version has moved on.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub row: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(row: T, version: u64) -> Self {
        Self { row, version }
    }
}

/// The singleton counter row act numbers are allocated from. Incremented
/// inside the approving unit of work, so a failed approval never consumes
/// a number and a consumed number is never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySequence {
    pub next_act_number: u64,
}

/// One write inside a unit of work.
#[derive(Debug, Clone)]
pub enum Write {
    InsertRegion(Region),
    InsertUser(User),
    InsertCitizen(Citizen),
    InsertAgent(Agent),
    InsertParcel(Parcel),
    UpdateParcel { row: Parcel, expected: u64 },
    InsertTransaction(Transaction),
    UpdateTransaction { row: Transaction, expected: u64 },
    InsertDispute(Dispute),
    UpdateDispute { row: Dispute, expected: u64 },
    UpdateSequence { row: RegistrySequence, expected: u64 },
    InsertDocument(Document),
    InsertNotification(Notification),
    AppendAudit(AuditEntry),
}

/// An ordered list of writes applied atomically: either every write
/// commits or none does. Inserts fail on an existing key, updates fail on
/// a version mismatch; audit appends always succeed if the rest does.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    writes: Vec<Write>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_region(&mut self, row: Region) -> &mut Self {
        self.writes.push(Write::InsertRegion(row));
        self
    }

    pub fn insert_user(&mut self, row: User) -> &mut Self {
        self.writes.push(Write::InsertUser(row));
        self
    }

    pub fn insert_citizen(&mut self, row: Citizen) -> &mut Self {
        self.writes.push(Write::InsertCitizen(row));
        self
    }

    pub fn insert_agent(&mut self, row: Agent) -> &mut Self {
        self.writes.push(Write::InsertAgent(row));
        self
    }

    pub fn insert_parcel(&mut self, row: Parcel) -> &mut Self {
        self.writes.push(Write::InsertParcel(row));
        self
    }

    /// Stage an update against the version observed at load time.
    pub fn update_parcel(&mut self, row: Parcel, expected: u64) -> &mut Self {
        self.writes.push(Write::UpdateParcel { row, expected });
        self
    }

    pub fn insert_transaction(&mut self, row: Transaction) -> &mut Self {
        self.writes.push(Write::InsertTransaction(row));
        self
    }

    pub fn update_transaction(&mut self, row: Transaction, expected: u64) -> &mut Self {
        self.writes.push(Write::UpdateTransaction { row, expected });
        self
    }

    pub fn insert_dispute(&mut self, row: Dispute) -> &mut Self {
        self.writes.push(Write::InsertDispute(row));
        self
    }

    pub fn update_dispute(&mut self, row: Dispute, expected: u64) -> &mut Self {
        self.writes.push(Write::UpdateDispute { row, expected });
        self
    }

    pub fn update_sequence(&mut self, row: RegistrySequence, expected: u64) -> &mut Self {
        self.writes.push(Write::UpdateSequence { row, expected });
        self
    }

    pub fn insert_document(&mut self, row: Document) -> &mut Self {
        self.writes.push(Write::InsertDocument(row));
        self
    }

    pub fn insert_notification(&mut self, row: Notification) -> &mut Self {
        self.writes.push(Write::InsertNotification(row));
        self
    }

    pub fn append_audit(&mut self, entry: AuditEntry) -> &mut Self {
        self.writes.push(Write::AppendAudit(entry));
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A staged update's expected version no longer matches the stored
    /// row: a concurrent unit of work committed first.
    #[error("write conflict on {kind} {id}: expected version {expected}, found {found}")]
    Conflict {
        kind: EntityKind,
        id: Uuid,
        expected: u64,
        found: u64,
    },

    /// An insert collided with an existing key.
    #[error("duplicate {kind} {id}")]
    Duplicate { kind: EntityKind, id: String },

    /// An update referenced a row that does not exist (deleted between
    /// load and commit).
    #[error("{kind} {id} vanished before commit")]
    Vanished { kind: EntityKind, id: Uuid },

    /// Backend failure (I/O, connection, serialization).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Durable key-based storage for every entity type the registry manages.
///
/// Lookups are typed; the predicate lookups the engines need are spelled
/// out as methods. All mutation goes through [`commit`](Self::commit).
#[async_trait]
pub trait RegistryStore: Send + Sync {
    // ── Reference data ──

    async fn region(&self, code: &str) -> Result<Option<Region>, StoreError>;

    // ── Accounts ──

    async fn user(&self, id: Uuid) -> Result<Option<Versioned<User>>, StoreError>;
    async fn citizen(&self, id: Uuid) -> Result<Option<Versioned<Citizen>>, StoreError>;
    async fn agent(&self, id: Uuid) -> Result<Option<Versioned<Agent>>, StoreError>;

    // ── Parcels ──

    async fn parcel(&self, id: Uuid) -> Result<Option<Versioned<Parcel>>, StoreError>;
    async fn parcel_by_numero(&self, numero: &str) -> Result<Option<Versioned<Parcel>>, StoreError>;
    async fn parcels_by_owner(&self, citizen_id: Uuid) -> Result<Vec<Parcel>, StoreError>;
    async fn parcels_in_region(&self, region_code: &str) -> Result<Vec<Parcel>, StoreError>;

    // ── Transactions ──

    async fn transaction(&self, id: Uuid) -> Result<Option<Versioned<Transaction>>, StoreError>;
    /// The PENDING transaction for a parcel, if any. At most one exists.
    async fn pending_transaction_for(
        &self,
        parcel_id: Uuid,
    ) -> Result<Option<Versioned<Transaction>>, StoreError>;
    async fn transactions_for_parcel(
        &self,
        parcel_id: Uuid,
    ) -> Result<Vec<Transaction>, StoreError>;

    // ── Disputes ──

    async fn dispute(&self, id: Uuid) -> Result<Option<Versioned<Dispute>>, StoreError>;
    /// OPEN/IN_PROGRESS disputes on a parcel, earliest opened first.
    async fn active_disputes_for(
        &self,
        parcel_id: Uuid,
    ) -> Result<Vec<Versioned<Dispute>>, StoreError>;

    // ── Registry sequence ──

    async fn sequence(&self) -> Result<Versioned<RegistrySequence>, StoreError>;

    // ── Documents / notifications / audit ──

    async fn documents_for(
        &self,
        owner_kind: EntityKind,
        owner_id: Uuid,
    ) -> Result<Vec<Document>, StoreError>;
    async fn unread_notifications_for(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, StoreError>;
    /// Audit trail for one entity, oldest first.
    async fn audit_for(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEntry>, StoreError>;

    // ── Commit ──

    /// Apply a unit of work atomically. On any version mismatch or key
    /// collision, nothing is applied and the offending write is reported.
    async fn commit(&self, uow: UnitOfWork) -> Result<(), StoreError>;
}
