//! Parcel Lifecycle Manager
//!
//! Sole owner of parcel status transitions. The workflow engines request
//! transitions through the staging methods here and commit the staged row
//! inside their own unit of work; the reservation operations are
//! standalone and commit on their own. Nothing else in the crate writes
//! `Parcel::status`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::model::{AuditEntry, EntityKind, Parcel, ParcelStatus};
use crate::store::{RegistryStore, UnitOfWork, Versioned};

/// Owns the parcel state machine.
///
/// Staging methods mutate an already-loaded row after checking the
/// transition table; the caller commits the row (with its observed
/// version) so the guard check and the write share one atomic unit.
#[derive(Clone)]
pub struct ParcelLifecycle {
    store: Arc<dyn RegistryStore>,
}

impl ParcelLifecycle {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    // ── Staged transitions (committed by the calling engine) ──

    /// AVAILABLE | OCCUPIED → IN_TRANSACTION. Any active hold (a pending
    /// transaction, a dispute, a reservation) rejects the entry.
    pub fn place_in_transaction(
        &self,
        parcel: &mut Parcel,
        now: DateTime<Utc>,
    ) -> RegistryResult<()> {
        if parcel.status.has_active_hold() {
            return Err(invalid_state(parcel, ParcelStatus::InTransaction));
        }
        set_status(parcel, ParcelStatus::InTransaction, now);
        Ok(())
    }

    /// IN_TRANSACTION → OCCUPIED, transferring ownership. Only the
    /// approval path calls this.
    pub fn occupy(
        &self,
        parcel: &mut Parcel,
        new_owner: Uuid,
        now: DateTime<Utc>,
    ) -> RegistryResult<()> {
        if parcel.status != ParcelStatus::InTransaction {
            return Err(invalid_state(parcel, ParcelStatus::Occupied));
        }
        parcel.current_owner = Some(new_owner);
        set_status(parcel, ParcelStatus::Occupied, now);
        Ok(())
    }

    /// IN_TRANSACTION → the exact pre-propose status: AVAILABLE when the
    /// parcel had no owner, OCCUPIED (same owner) otherwise. Undoes the
    /// propose side effect on rejection or cancellation.
    pub fn restore_after_transaction(
        &self,
        parcel: &mut Parcel,
        now: DateTime<Utc>,
    ) -> RegistryResult<()> {
        if parcel.status != ParcelStatus::InTransaction {
            return Err(invalid_state(parcel, ParcelStatus::Available));
        }
        let restored = match parcel.current_owner {
            Some(_) => ParcelStatus::Occupied,
            None => ParcelStatus::Available,
        };
        set_status(parcel, restored, now);
        Ok(())
    }

    /// Any status → IN_DISPUTE. Idempotent: returns `false` (and stages
    /// nothing) when the parcel is already disputed, so the caller knows
    /// not to write the parcel row.
    pub fn place_in_dispute(&self, parcel: &mut Parcel, now: DateTime<Utc>) -> RegistryResult<bool> {
        if parcel.status == ParcelStatus::InDispute {
            return Ok(false);
        }
        set_status(parcel, ParcelStatus::InDispute, now);
        Ok(true)
    }

    /// IN_DISPUTE → the status recorded when the dispute opened. Called
    /// only when the last active dispute on the parcel clears.
    pub fn restore_after_dispute(
        &self,
        parcel: &mut Parcel,
        prior: ParcelStatus,
        now: DateTime<Utc>,
    ) -> RegistryResult<()> {
        if parcel.status != ParcelStatus::InDispute {
            return Err(invalid_state(parcel, prior));
        }
        if prior == ParcelStatus::InDispute {
            // A recorded prior status of IN_DISPUTE means the dispute row
            // was created outside the engine; restoring it would strand
            // the parcel.
            return Err(RegistryError::invalid_transition(
                EntityKind::Parcel,
                format!(
                    "parcel {} has IN_DISPUTE recorded as its pre-dispute status",
                    parcel.numero
                ),
            ));
        }
        set_status(parcel, prior, now);
        Ok(())
    }

    // ── Reservation (standalone operations, outside the workflow flow) ──

    /// AVAILABLE → RESERVED. A reservation is an administrative hold that
    /// blocks new transactions until released.
    pub async fn reserve(
        &self,
        parcel_id: Uuid,
        actor: Uuid,
        reason: &str,
    ) -> RegistryResult<Parcel> {
        let now = Utc::now();
        let loaded = self.load(parcel_id).await?;
        let Versioned { row: mut parcel, version } = loaded;

        if parcel.status != ParcelStatus::Available {
            return Err(invalid_state(&parcel, ParcelStatus::Reserved));
        }
        let before = parcel.clone();
        set_status(&mut parcel, ParcelStatus::Reserved, now);

        let mut uow = UnitOfWork::new();
        uow.update_parcel(parcel.clone(), version);
        uow.append_audit(
            AuditEntry::transition(
                actor,
                "parcel.reserve",
                EntityKind::Parcel,
                parcel.parcel_id,
                Some(&before),
                &parcel,
                now,
            )
            .with_note(reason),
        );
        self.store.commit(uow).await?;

        info!(numero = %parcel.numero, "parcel reserved");
        Ok(parcel)
    }

    /// RESERVED → AVAILABLE, or OCCUPIED when an owner is set.
    pub async fn release(
        &self,
        parcel_id: Uuid,
        actor: Uuid,
        reason: &str,
    ) -> RegistryResult<Parcel> {
        let now = Utc::now();
        let loaded = self.load(parcel_id).await?;
        let Versioned { row: mut parcel, version } = loaded;

        if parcel.status != ParcelStatus::Reserved {
            return Err(invalid_state(&parcel, ParcelStatus::Available));
        }
        let before = parcel.clone();
        let restored = match parcel.current_owner {
            Some(_) => ParcelStatus::Occupied,
            None => ParcelStatus::Available,
        };
        set_status(&mut parcel, restored, now);

        let mut uow = UnitOfWork::new();
        uow.update_parcel(parcel.clone(), version);
        uow.append_audit(
            AuditEntry::transition(
                actor,
                "parcel.release",
                EntityKind::Parcel,
                parcel.parcel_id,
                Some(&before),
                &parcel,
                now,
            )
            .with_note(reason),
        );
        self.store.commit(uow).await?;

        info!(numero = %parcel.numero, status = %parcel.status, "parcel reservation released");
        Ok(parcel)
    }

    async fn load(&self, parcel_id: Uuid) -> RegistryResult<Versioned<Parcel>> {
        self.store
            .parcel(parcel_id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Parcel, parcel_id))
    }
}

fn set_status(parcel: &mut Parcel, status: ParcelStatus, now: DateTime<Utc>) {
    parcel.status = status;
    parcel.updated_at = now;
}

fn invalid_state(parcel: &Parcel, requested: ParcelStatus) -> RegistryError {
    RegistryError::InvalidParcelState {
        numero: parcel.numero.clone(),
        current: parcel.status,
        requested,
    }
}
