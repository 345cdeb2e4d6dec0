//! Dispute Workflow Engine
//!
//! Drives the dispute state machine (OPEN → IN_PROGRESS → RESOLVED →
//! CLOSED, with OPEN → CLOSED for withdrawals) and the IN_DISPUTE hold on
//! the parcel. The parcel's pre-dispute status is recorded on the dispute
//! row at open time and restored — never inferred — when the last active
//! dispute on the parcel clears.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::lifecycle::ParcelLifecycle;
use crate::model::{
    AuditEntry, Citizen, Dispute, DisputeStatus, DisputeType, EntityKind, Parcel, ParcelStatus,
    User,
};
use crate::notify::{Notice, Notifier, RegistryEvent};
use crate::store::{RegistryStore, UnitOfWork, Versioned};

/// Input for [`DisputeEngine::open`].
#[derive(Debug, Clone)]
pub struct OpenDispute {
    pub parcel_id: Uuid,
    pub complainant: Uuid,
    pub defendant: Option<Uuid>,
    pub kind: DisputeType,
    pub description: String,
}

/// Opens, assigns, resolves and closes disputes.
pub struct DisputeEngine {
    store: Arc<dyn RegistryStore>,
    lifecycle: ParcelLifecycle,
    notifier: Arc<dyn Notifier>,
}

impl DisputeEngine {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        lifecycle: ParcelLifecycle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            notifier,
        }
    }

    /// Open a dispute on a parcel, placing it IN_DISPUTE.
    ///
    /// Idempotent on the parcel hold: a second dispute on an already
    /// disputed parcel appends its row without re-triggering the
    /// transition, and copies the true pre-dispute status from the
    /// earliest active dispute so restoration never loses it.
    pub async fn open(&self, req: OpenDispute) -> RegistryResult<Dispute> {
        let now = Utc::now();

        let parcel = self.load_parcel(req.parcel_id).await?;
        let complainant = self.load_citizen(req.complainant).await?;
        if let Some(defendant) = req.defendant {
            self.load_citizen(defendant).await?;
        }

        let previous_parcel_status = if parcel.row.status == ParcelStatus::InDispute {
            let active = self.store.active_disputes_for(req.parcel_id).await?;
            match active.first() {
                Some(first) => first.row.previous_parcel_status,
                None => {
                    return Err(RegistryError::invalid_transition(
                        EntityKind::Parcel,
                        format!(
                            "parcel {} is marked IN_DISPUTE but carries no active dispute",
                            parcel.row.numero
                        ),
                    ));
                }
            }
        } else {
            parcel.row.status
        };

        let Versioned {
            row: mut parcel_row,
            version: parcel_version,
        } = parcel;
        let parcel_before = parcel_row.clone();
        let staged = self.lifecycle.place_in_dispute(&mut parcel_row, now)?;

        let dispute = Dispute {
            dispute_id: Uuid::new_v4(),
            parcel_id: parcel_row.parcel_id,
            complainant: req.complainant,
            defendant: req.defendant,
            kind: req.kind,
            description: req.description,
            status: DisputeStatus::Open,
            assigned_agent: None,
            previous_parcel_status,
            resolution: None,
            opened_at: now,
            resolved_at: None,
        };

        let actor = complainant.row.user_id;
        let mut uow = UnitOfWork::new();
        uow.insert_dispute(dispute.clone());
        uow.append_audit(AuditEntry::transition(
            actor,
            "dispute.open",
            EntityKind::Dispute,
            dispute.dispute_id,
            None,
            &dispute,
            now,
        ));
        if staged {
            uow.update_parcel(parcel_row.clone(), parcel_version);
            uow.append_audit(AuditEntry::transition(
                actor,
                "parcel.enter_dispute",
                EntityKind::Parcel,
                parcel_row.parcel_id,
                Some(&parcel_before),
                &parcel_row,
                now,
            ));
        }
        self.store.commit(uow).await?;

        info!(
            dispute = %dispute.dispute_id,
            numero = %parcel_row.numero,
            kind = ?dispute.kind,
            "dispute opened"
        );

        let payload = json!({
            "dispute_id": dispute.dispute_id,
            "parcel": parcel_row.numero,
        });
        self.notify_parties(RegistryEvent::DisputeOpened, &dispute, payload).await;

        Ok(dispute)
    }

    /// Assign an agent, moving an OPEN dispute to IN_PROGRESS.
    pub async fn assign(
        &self,
        dispute_id: Uuid,
        agent_id: Uuid,
        assigned_by: Uuid,
    ) -> RegistryResult<Dispute> {
        let now = Utc::now();

        let dispute = self.load_dispute(dispute_id).await?;
        if !dispute.row.status.is_active() {
            return Err(RegistryError::invalid_transition(
                EntityKind::Dispute,
                format!("dispute {} is already {}", dispute_id, dispute.row.status),
            ));
        }
        let agent = self
            .store
            .agent(agent_id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Agent, agent_id))?;
        let agent_user = self.load_user(agent.row.user_id).await?;
        if !agent.row.is_active() || !agent_user.row.is_active() {
            return Err(RegistryError::Authorization(format!(
                "agent {} may not take assignments while {}",
                agent.row.registration_number, agent.row.status
            )));
        }

        let mut assigned = dispute.row.clone();
        assigned.assigned_agent = Some(agent_id);
        if assigned.status == DisputeStatus::Open {
            assigned.status = DisputeStatus::InProgress;
        }

        let mut uow = UnitOfWork::new();
        uow.update_dispute(assigned.clone(), dispute.version);
        uow.append_audit(AuditEntry::transition(
            assigned_by,
            "dispute.assign",
            EntityKind::Dispute,
            assigned.dispute_id,
            Some(&dispute.row),
            &assigned,
            now,
        ));
        self.store.commit(uow).await?;

        info!(
            dispute = %assigned.dispute_id,
            agent = %agent.row.registration_number,
            "dispute assigned"
        );

        self.notifier.notify(Notice {
            event: RegistryEvent::DisputeAssigned,
            target_user: agent_user.row.user_id,
            payload: json!({ "dispute_id": assigned.dispute_id }),
        });

        Ok(assigned)
    }

    /// Resolve an active dispute. When no other active dispute remains on
    /// the parcel, the parcel is restored to the recorded prior status.
    pub async fn resolve(
        &self,
        dispute_id: Uuid,
        actor: Uuid,
        resolution: &str,
    ) -> RegistryResult<Dispute> {
        let now = Utc::now();

        let dispute = self.load_dispute(dispute_id).await?;
        if !dispute.row.status.is_active() {
            return Err(RegistryError::invalid_transition(
                EntityKind::Dispute,
                format!("dispute {} is already {}", dispute_id, dispute.row.status),
            ));
        }

        let mut resolved = dispute.row.clone();
        resolved.status = DisputeStatus::Resolved;
        resolved.resolution = Some(resolution.to_string());
        resolved.resolved_at = Some(now);

        let mut uow = UnitOfWork::new();
        uow.update_dispute(resolved.clone(), dispute.version);
        uow.append_audit(
            AuditEntry::transition(
                actor,
                "dispute.resolve",
                EntityKind::Dispute,
                resolved.dispute_id,
                Some(&dispute.row),
                &resolved,
                now,
            )
            .with_note(resolution),
        );
        self.stage_parcel_restore(&resolved, actor, now, &mut uow).await?;
        self.store.commit(uow).await?;

        info!(dispute = %resolved.dispute_id, "dispute resolved");

        let payload = json!({
            "dispute_id": resolved.dispute_id,
            "resolution": resolution,
        });
        self.notify_parties(RegistryEvent::DisputeResolved, &resolved, payload).await;

        Ok(resolved)
    }

    /// Close a dispute. Terminal. Permitted from OPEN/IN_PROGRESS
    /// (withdrawal — restores the parcel like resolve does) and from
    /// RESOLVED (the parcel was already restored then).
    pub async fn close(
        &self,
        dispute_id: Uuid,
        actor: Uuid,
        resolution: Option<&str>,
    ) -> RegistryResult<Dispute> {
        let now = Utc::now();

        let dispute = self.load_dispute(dispute_id).await?;
        if dispute.row.status == DisputeStatus::Closed {
            return Err(RegistryError::invalid_transition(
                EntityKind::Dispute,
                format!("dispute {dispute_id} is already CLOSED"),
            ));
        }
        let was_active = dispute.row.status.is_active();

        let mut closed = dispute.row.clone();
        closed.status = DisputeStatus::Closed;
        if let Some(text) = resolution {
            closed.resolution = Some(text.to_string());
        }
        if closed.resolved_at.is_none() {
            closed.resolved_at = Some(now);
        }

        let mut uow = UnitOfWork::new();
        uow.update_dispute(closed.clone(), dispute.version);
        let mut entry = AuditEntry::transition(
            actor,
            "dispute.close",
            EntityKind::Dispute,
            closed.dispute_id,
            Some(&dispute.row),
            &closed,
            now,
        );
        if let Some(text) = resolution {
            entry = entry.with_note(text);
        }
        uow.append_audit(entry);
        if was_active {
            self.stage_parcel_restore(&closed, actor, now, &mut uow).await?;
        }
        self.store.commit(uow).await?;

        info!(dispute = %closed.dispute_id, "dispute closed");

        let payload = json!({ "dispute_id": closed.dispute_id });
        self.notify_parties(RegistryEvent::DisputeClosed, &closed, payload).await;

        Ok(closed)
    }

    // ── Internals ──

    /// Stage the parcel restore when `dispute` (already moved to a
    /// non-active status in memory) was the last active dispute on its
    /// parcel. Otherwise the parcel stays IN_DISPUTE untouched.
    async fn stage_parcel_restore(
        &self,
        dispute: &Dispute,
        actor: Uuid,
        now: chrono::DateTime<Utc>,
        uow: &mut UnitOfWork,
    ) -> RegistryResult<()> {
        let remaining = self
            .store
            .active_disputes_for(dispute.parcel_id)
            .await?
            .into_iter()
            .filter(|d| d.row.dispute_id != dispute.dispute_id)
            .count();
        if remaining > 0 {
            return Ok(());
        }

        let parcel = self.load_parcel(dispute.parcel_id).await?;
        let Versioned {
            row: mut parcel_row,
            version: parcel_version,
        } = parcel;
        let parcel_before = parcel_row.clone();
        self.lifecycle
            .restore_after_dispute(&mut parcel_row, dispute.previous_parcel_status, now)?;

        uow.update_parcel(parcel_row.clone(), parcel_version);
        uow.append_audit(AuditEntry::transition(
            actor,
            "parcel.exit_dispute",
            EntityKind::Parcel,
            parcel_row.parcel_id,
            Some(&parcel_before),
            &parcel_row,
            now,
        ));
        Ok(())
    }

    async fn notify_parties(&self, event: RegistryEvent, dispute: &Dispute, payload: serde_json::Value) {
        let mut targets = Vec::new();
        if let Ok(Some(complainant)) = self.store.citizen(dispute.complainant).await {
            targets.push(complainant.row.user_id);
        }
        if let Some(defendant) = dispute.defendant {
            if let Ok(Some(citizen)) = self.store.citizen(defendant).await {
                targets.push(citizen.row.user_id);
            }
        }
        for target_user in targets {
            self.notifier.notify(Notice {
                event,
                target_user,
                payload: payload.clone(),
            });
        }
    }

    async fn load_dispute(&self, id: Uuid) -> RegistryResult<Versioned<Dispute>> {
        self.store
            .dispute(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Dispute, id))
    }

    async fn load_parcel(&self, id: Uuid) -> RegistryResult<Versioned<Parcel>> {
        self.store
            .parcel(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Parcel, id))
    }

    async fn load_citizen(&self, id: Uuid) -> RegistryResult<Versioned<Citizen>> {
        self.store
            .citizen(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Citizen, id))
    }

    async fn load_user(&self, id: Uuid) -> RegistryResult<Versioned<User>> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::User, id))
    }
}
