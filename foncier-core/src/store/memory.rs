//! In-memory store backend.
//!
//! Backs tests and demos. Rows live in hash maps guarded by one mutex;
//! a commit validates every staged write under the lock, then applies
//! them all, so a unit of work is atomic and version checks are exact.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{
    Agent, AuditEntry, Citizen, Dispute, Document, EntityKind, Notification, Parcel, Region,
    Transaction, TransactionStatus, User,
};

use super::{RegistrySequence, RegistryStore, StoreError, UnitOfWork, Versioned, Write};

struct Inner {
    regions: HashMap<String, Region>,
    users: HashMap<Uuid, (User, u64)>,
    citizens: HashMap<Uuid, (Citizen, u64)>,
    agents: HashMap<Uuid, (Agent, u64)>,
    parcels: HashMap<Uuid, (Parcel, u64)>,
    transactions: HashMap<Uuid, (Transaction, u64)>,
    disputes: HashMap<Uuid, (Dispute, u64)>,
    documents: Vec<Document>,
    notifications: Vec<Notification>,
    audit: Vec<AuditEntry>,
    sequence: (RegistrySequence, u64),
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            regions: HashMap::new(),
            users: HashMap::new(),
            citizens: HashMap::new(),
            agents: HashMap::new(),
            parcels: HashMap::new(),
            transactions: HashMap::new(),
            disputes: HashMap::new(),
            documents: Vec::new(),
            notifications: Vec::new(),
            audit: Vec::new(),
            sequence: (RegistrySequence { next_act_number: 1 }, 1),
        }
    }
}

/// Thread-safe in-memory [`RegistryStore`].
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }
}

fn validate(inner: &Inner, write: &Write) -> Result<(), StoreError> {
    fn check_update<T>(
        map: &HashMap<Uuid, (T, u64)>,
        kind: EntityKind,
        id: Uuid,
        expected: u64,
    ) -> Result<(), StoreError> {
        match map.get(&id) {
            None => Err(StoreError::Vanished { kind, id }),
            Some((_, found)) if *found != expected => Err(StoreError::Conflict {
                kind,
                id,
                expected,
                found: *found,
            }),
            Some(_) => Ok(()),
        }
    }

    fn check_insert<T>(
        map: &HashMap<Uuid, (T, u64)>,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<(), StoreError> {
        if map.contains_key(&id) {
            Err(StoreError::Duplicate {
                kind,
                id: id.to_string(),
            })
        } else {
            Ok(())
        }
    }

    match write {
        Write::InsertRegion(r) => {
            if inner.regions.contains_key(&r.code) {
                return Err(StoreError::Duplicate {
                    kind: EntityKind::Region,
                    id: r.code.clone(),
                });
            }
            Ok(())
        }
        Write::InsertUser(u) => check_insert(&inner.users, EntityKind::User, u.user_id),
        Write::InsertCitizen(c) => check_insert(&inner.citizens, EntityKind::Citizen, c.citizen_id),
        Write::InsertAgent(a) => check_insert(&inner.agents, EntityKind::Agent, a.agent_id),
        Write::InsertParcel(p) => {
            check_insert(&inner.parcels, EntityKind::Parcel, p.parcel_id)?;
            if inner.parcels.values().any(|(row, _)| row.numero == p.numero) {
                return Err(StoreError::Duplicate {
                    kind: EntityKind::Parcel,
                    id: p.numero.clone(),
                });
            }
            Ok(())
        }
        Write::UpdateParcel { row, expected } => {
            check_update(&inner.parcels, EntityKind::Parcel, row.parcel_id, *expected)
        }
        Write::InsertTransaction(t) => {
            check_insert(&inner.transactions, EntityKind::Transaction, t.transaction_id)
        }
        Write::UpdateTransaction { row, expected } => check_update(
            &inner.transactions,
            EntityKind::Transaction,
            row.transaction_id,
            *expected,
        ),
        Write::InsertDispute(d) => check_insert(&inner.disputes, EntityKind::Dispute, d.dispute_id),
        Write::UpdateDispute { row, expected } => check_update(
            &inner.disputes,
            EntityKind::Dispute,
            row.dispute_id,
            *expected,
        ),
        Write::UpdateSequence { expected, .. } => {
            let found = inner.sequence.1;
            if found != *expected {
                return Err(StoreError::Conflict {
                    kind: EntityKind::Sequence,
                    id: Uuid::nil(),
                    expected: *expected,
                    found,
                });
            }
            Ok(())
        }
        Write::InsertDocument(_) | Write::InsertNotification(_) | Write::AppendAudit(_) => Ok(()),
    }
}

fn apply(inner: &mut Inner, write: Write) {
    match write {
        Write::InsertRegion(r) => {
            inner.regions.insert(r.code.clone(), r);
        }
        Write::InsertUser(u) => {
            inner.users.insert(u.user_id, (u, 1));
        }
        Write::InsertCitizen(c) => {
            inner.citizens.insert(c.citizen_id, (c, 1));
        }
        Write::InsertAgent(a) => {
            inner.agents.insert(a.agent_id, (a, 1));
        }
        Write::InsertParcel(p) => {
            inner.parcels.insert(p.parcel_id, (p, 1));
        }
        Write::UpdateParcel { row, expected } => {
            inner.parcels.insert(row.parcel_id, (row, expected + 1));
        }
        Write::InsertTransaction(t) => {
            inner.transactions.insert(t.transaction_id, (t, 1));
        }
        Write::UpdateTransaction { row, expected } => {
            inner
                .transactions
                .insert(row.transaction_id, (row, expected + 1));
        }
        Write::InsertDispute(d) => {
            inner.disputes.insert(d.dispute_id, (d, 1));
        }
        Write::UpdateDispute { row, expected } => {
            inner.disputes.insert(row.dispute_id, (row, expected + 1));
        }
        Write::UpdateSequence { row, expected } => {
            inner.sequence = (row, expected + 1);
        }
        Write::InsertDocument(d) => inner.documents.push(d),
        Write::InsertNotification(n) => inner.notifications.push(n),
        Write::AppendAudit(entry) => inner.audit.push(entry),
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn region(&self, code: &str) -> Result<Option<Region>, StoreError> {
        Ok(self.lock()?.regions.get(code).cloned())
    }

    async fn user(&self, id: Uuid) -> Result<Option<Versioned<User>>, StoreError> {
        Ok(self
            .lock()?
            .users
            .get(&id)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn citizen(&self, id: Uuid) -> Result<Option<Versioned<Citizen>>, StoreError> {
        Ok(self
            .lock()?
            .citizens
            .get(&id)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn agent(&self, id: Uuid) -> Result<Option<Versioned<Agent>>, StoreError> {
        Ok(self
            .lock()?
            .agents
            .get(&id)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn parcel(&self, id: Uuid) -> Result<Option<Versioned<Parcel>>, StoreError> {
        Ok(self
            .lock()?
            .parcels
            .get(&id)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn parcel_by_numero(
        &self,
        numero: &str,
    ) -> Result<Option<Versioned<Parcel>>, StoreError> {
        Ok(self
            .lock()?
            .parcels
            .values()
            .find(|(row, _)| row.numero == numero)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn parcels_by_owner(&self, citizen_id: Uuid) -> Result<Vec<Parcel>, StoreError> {
        let mut rows: Vec<Parcel> = self
            .lock()?
            .parcels
            .values()
            .filter(|(row, _)| row.current_owner == Some(citizen_id))
            .map(|(row, _)| row.clone())
            .collect();
        rows.sort_by(|a, b| a.numero.cmp(&b.numero));
        Ok(rows)
    }

    async fn parcels_in_region(&self, region_code: &str) -> Result<Vec<Parcel>, StoreError> {
        let mut rows: Vec<Parcel> = self
            .lock()?
            .parcels
            .values()
            .filter(|(row, _)| row.region_code == region_code)
            .map(|(row, _)| row.clone())
            .collect();
        rows.sort_by(|a, b| a.numero.cmp(&b.numero));
        Ok(rows)
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<Versioned<Transaction>>, StoreError> {
        Ok(self
            .lock()?
            .transactions
            .get(&id)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn pending_transaction_for(
        &self,
        parcel_id: Uuid,
    ) -> Result<Option<Versioned<Transaction>>, StoreError> {
        Ok(self
            .lock()?
            .transactions
            .values()
            .find(|(row, _)| {
                row.parcel_id == parcel_id && row.status == TransactionStatus::Pending
            })
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn transactions_for_parcel(
        &self,
        parcel_id: Uuid,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut rows: Vec<Transaction> = self
            .lock()?
            .transactions
            .values()
            .filter(|(row, _)| row.parcel_id == parcel_id)
            .map(|(row, _)| row.clone())
            .collect();
        rows.sort_by_key(|t| t.proposed_at);
        Ok(rows)
    }

    async fn dispute(&self, id: Uuid) -> Result<Option<Versioned<Dispute>>, StoreError> {
        Ok(self
            .lock()?
            .disputes
            .get(&id)
            .map(|(row, v)| Versioned::new(row.clone(), *v)))
    }

    async fn active_disputes_for(
        &self,
        parcel_id: Uuid,
    ) -> Result<Vec<Versioned<Dispute>>, StoreError> {
        let mut rows: Vec<Versioned<Dispute>> = self
            .lock()?
            .disputes
            .values()
            .filter(|(row, _)| row.parcel_id == parcel_id && row.status.is_active())
            .map(|(row, v)| Versioned::new(row.clone(), *v))
            .collect();
        rows.sort_by_key(|d| d.row.opened_at);
        Ok(rows)
    }

    async fn sequence(&self) -> Result<Versioned<RegistrySequence>, StoreError> {
        let inner = self.lock()?;
        Ok(Versioned::new(inner.sequence.0.clone(), inner.sequence.1))
    }

    async fn documents_for(
        &self,
        owner_kind: EntityKind,
        owner_id: Uuid,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .lock()?
            .documents
            .iter()
            .filter(|d| d.owner_kind == owner_kind && d.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn unread_notifications_for(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .lock()?
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .cloned()
            .collect())
    }

    async fn audit_for(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .lock()?
            .audit
            .iter()
            .filter(|e| e.entity_kind == entity_kind && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, uow: UnitOfWork) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        // Validate every write before touching anything, so a failed unit
        // of work leaves no partial state visible.
        for write in uow.writes() {
            validate(&inner, write)?;
        }
        for write in uow.into_writes() {
            apply(&mut inner, write);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LandType, ParcelStatus};
    use chrono::Utc;

    fn parcel(numero: &str) -> Parcel {
        Parcel {
            parcel_id: Uuid::new_v4(),
            numero: numero.to_string(),
            area_m2: 400.0,
            land_type: LandType::Residential,
            status: ParcelStatus::Available,
            current_owner: None,
            region_code: "LIT".to_string(),
            address: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = MemoryStore::new();
        let p = parcel("LIT-0001");
        let id = p.parcel_id;

        let mut uow = UnitOfWork::new();
        uow.insert_parcel(p);
        store.commit(uow).await.unwrap();

        let loaded = store.parcel(id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);

        // First writer wins.
        let mut uow = UnitOfWork::new();
        uow.update_parcel(loaded.row.clone(), loaded.version);
        store.commit(uow).await.unwrap();

        // Second writer staged against the stale version loses.
        let mut uow = UnitOfWork::new();
        uow.update_parcel(loaded.row.clone(), loaded.version);
        let err = store.commit(uow).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, found: 2, .. }));
    }

    #[tokio::test]
    async fn failed_unit_of_work_applies_nothing() {
        let store = MemoryStore::new();
        let p = parcel("LIT-0002");
        let id = p.parcel_id;

        let mut uow = UnitOfWork::new();
        uow.insert_parcel(p.clone());
        store.commit(uow).await.unwrap();

        // Valid parcel update + stale sequence update in one unit.
        let loaded = store.parcel(id).await.unwrap().unwrap();
        let mut updated = loaded.row.clone();
        updated.status = ParcelStatus::Reserved;
        let mut uow = UnitOfWork::new();
        uow.update_parcel(updated, loaded.version);
        uow.update_sequence(RegistrySequence { next_act_number: 99 }, 42);
        assert!(store.commit(uow).await.is_err());

        // The parcel update was not applied either.
        let after = store.parcel(id).await.unwrap().unwrap();
        assert_eq!(after.row.status, ParcelStatus::Available);
        assert_eq!(after.version, 1);
        assert_eq!(store.sequence().await.unwrap().row.next_act_number, 1);
    }

    #[tokio::test]
    async fn duplicate_numero_rejected() {
        let store = MemoryStore::new();
        let mut uow = UnitOfWork::new();
        uow.insert_parcel(parcel("LIT-0003"));
        store.commit(uow).await.unwrap();

        let mut uow = UnitOfWork::new();
        uow.insert_parcel(parcel("LIT-0003"));
        assert!(matches!(
            store.commit(uow).await,
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn sequence_starts_at_one() {
        let store = MemoryStore::new();
        let seq = store.sequence().await.unwrap();
        assert_eq!(seq.row.next_act_number, 1);
    }

    #[tokio::test]
    async fn reference_and_register_queries() {
        let store = MemoryStore::new();
        let mut uow = UnitOfWork::new();
        uow.insert_region(Region::new("LIT", "Littoral"));
        uow.insert_parcel(parcel("LIT-0004"));
        uow.insert_parcel(parcel("LIT-0005"));
        store.commit(uow).await.unwrap();

        assert_eq!(store.region("LIT").await.unwrap().unwrap().name, "Littoral");
        assert!(store.region("NOR").await.unwrap().is_none());

        let by_numero = store.parcel_by_numero("LIT-0004").await.unwrap();
        assert!(by_numero.is_some());
        assert!(store.parcel_by_numero("LIT-9999").await.unwrap().is_none());

        let in_region = store.parcels_in_region("LIT").await.unwrap();
        assert_eq!(in_region.len(), 2);
        assert_eq!(in_region[0].numero, "LIT-0004");
    }
}
