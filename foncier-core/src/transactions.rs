//! Transaction Workflow Engine
//!
//! Drives the transaction state machine (PENDING → APPROVED | REJECTED |
//! CANCELLED) and keeps it in lockstep with the parcel lifecycle. Every
//! operation commits all of its writes — transaction row, parcel row,
//! sequence row, audit entries — as one unit of work, then emits
//! notifications fire-and-forget.
//!
//! Race policy: when two terminal operations compete on one PENDING
//! transaction, the guard re-read catches the late caller with
//! `InvalidTransition`, and the commit-time version check catches the
//! true race with `Conflict`. Either way exactly one side effect applies.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};
use crate::lifecycle::ParcelLifecycle;
use crate::model::{
    Agent, AuditEntry, Citizen, Document, DocumentKind, EntityKind, Parcel, ParcelStatus,
    Transaction, TransactionStatus, TransactionType, User, UserRole,
};
use crate::notify::{Notice, Notifier, RegistryEvent};
use crate::store::{RegistryStore, UnitOfWork, Versioned};

/// Input for [`TransactionEngine::propose`].
#[derive(Debug, Clone)]
pub struct ProposeTransaction {
    pub parcel_id: Uuid,
    pub kind: TransactionType,
    pub new_owner: Uuid,
    pub previous_owner: Option<Uuid>,
    pub amount: Decimal,
    pub proposed_by: Uuid,
}

/// Proposes, validates, rejects and cancels ownership transactions.
pub struct TransactionEngine {
    store: Arc<dyn RegistryStore>,
    lifecycle: ParcelLifecycle,
    notifier: Arc<dyn Notifier>,
}

impl TransactionEngine {
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

    /// Propose an ownership change on a parcel.
    ///
    /// Creates the PENDING transaction and places the parcel
    /// IN_TRANSACTION in the same unit of work.
    pub async fn propose(&self, req: ProposeTransaction) -> RegistryResult<Transaction> {
        let now = Utc::now();

        let parcel = self.load_parcel(req.parcel_id).await?;
        let new_owner = self.load_citizen(req.new_owner).await?;
        let previous_owner = match req.previous_owner {
            Some(id) => Some(self.load_citizen(id).await?),
            None => None,
        };
        let proposer = self.load_user(req.proposed_by).await?;

        if !proposer.row.is_active() {
            return Err(RegistryError::Authorization(format!(
                "account {} is {}",
                proposer.row.email, proposer.row.status
            )));
        }
        if req.amount < Decimal::ZERO {
            return Err(RegistryError::Validation(format!(
                "amount {} is negative",
                req.amount
            )));
        }
        if req.previous_owner == Some(req.new_owner) {
            return Err(RegistryError::Validation(
                "new owner and previous owner are the same citizen".into(),
            ));
        }
        if req.previous_owner != parcel.row.current_owner {
            return Err(RegistryError::Validation(format!(
                "previous owner does not match the registered owner of parcel {}",
                parcel.row.numero
            )));
        }

        let Versioned {
            row: mut parcel_row,
            version: parcel_version,
        } = parcel;
        let parcel_before = parcel_row.clone();
        self.lifecycle.place_in_transaction(&mut parcel_row, now)?;

        let transaction = Transaction {
            transaction_id: Uuid::new_v4(),
            parcel_id: parcel_row.parcel_id,
            kind: req.kind,
            previous_owner: req.previous_owner,
            new_owner: req.new_owner,
            amount: req.amount,
            status: TransactionStatus::Pending,
            proposed_by: req.proposed_by,
            proposed_at: now,
            validating_agent: None,
            validated_at: None,
            act_number: None,
            decision_reason: None,
        };

        let mut uow = UnitOfWork::new();
        uow.insert_transaction(transaction.clone());
        uow.update_parcel(parcel_row.clone(), parcel_version);
        uow.append_audit(AuditEntry::transition(
            req.proposed_by,
            "transaction.propose",
            EntityKind::Transaction,
            transaction.transaction_id,
            None,
            &transaction,
            now,
        ));
        uow.append_audit(AuditEntry::transition(
            req.proposed_by,
            "parcel.enter_transaction",
            EntityKind::Parcel,
            parcel_row.parcel_id,
            Some(&parcel_before),
            &parcel_row,
            now,
        ));
        self.store.commit(uow).await?;

        info!(
            transaction = %transaction.transaction_id,
            numero = %parcel_row.numero,
            kind = ?req.kind,
            "transaction proposed"
        );

        let payload = json!({
            "transaction_id": transaction.transaction_id,
            "parcel": parcel_row.numero,
            "amount": transaction.amount,
        });
        self.notify_parties(
            RegistryEvent::TransactionProposed,
            &new_owner.row,
            previous_owner.as_ref().map(|c| &c.row),
            payload,
        );

        Ok(transaction)
    }

    /// Approve a PENDING transaction: allocate the act number, transfer
    /// ownership, occupy the parcel, record the act document.
    pub async fn approve(&self, transaction_id: Uuid, agent_id: Uuid) -> RegistryResult<Transaction> {
        let now = Utc::now();

        let tx = self.load_pending(transaction_id).await?;
        let parcel = self.load_parcel(tx.row.parcel_id).await?;
        self.ensure_not_disputed(&parcel.row, ParcelStatus::Occupied)?;
        let (agent, agent_user) = self.active_agent(agent_id).await?;
        let new_owner = self.load_citizen(tx.row.new_owner).await?;
        let previous_owner = match tx.row.previous_owner {
            Some(id) => Some(self.load_citizen(id).await?),
            None => None,
        };

        let sequence = self.store.sequence().await?;
        let act_number = sequence.row.next_act_number;
        let mut next = sequence.row.clone();
        next.next_act_number += 1;

        let Versioned {
            row: mut parcel_row,
            version: parcel_version,
        } = parcel;
        let parcel_before = parcel_row.clone();
        self.lifecycle.occupy(&mut parcel_row, tx.row.new_owner, now)?;

        let mut approved = tx.row.clone();
        approved.status = TransactionStatus::Approved;
        approved.validating_agent = Some(agent.agent_id);
        approved.validated_at = Some(now);
        approved.act_number = Some(act_number);

        let act = Document {
            document_id: Uuid::new_v4(),
            owner_kind: EntityKind::Transaction,
            owner_id: approved.transaction_id,
            kind: DocumentKind::Act,
            title: format!("Ownership act #{act_number}"),
            reference: format!("ACT-{act_number:06}"),
            added_at: now,
        };

        let mut uow = UnitOfWork::new();
        uow.update_transaction(approved.clone(), tx.version);
        uow.update_parcel(parcel_row.clone(), parcel_version);
        uow.update_sequence(next, sequence.version);
        uow.insert_document(act);
        uow.append_audit(AuditEntry::transition(
            agent_user.user_id,
            "transaction.approve",
            EntityKind::Transaction,
            approved.transaction_id,
            Some(&tx.row),
            &approved,
            now,
        ));
        uow.append_audit(AuditEntry::transition(
            agent_user.user_id,
            "parcel.transfer_ownership",
            EntityKind::Parcel,
            parcel_row.parcel_id,
            Some(&parcel_before),
            &parcel_row,
            now,
        ));
        self.store.commit(uow).await?;

        info!(
            transaction = %approved.transaction_id,
            numero = %parcel_row.numero,
            act_number,
            agent = %agent.registration_number,
            "transaction approved"
        );

        let payload = json!({
            "transaction_id": approved.transaction_id,
            "parcel": parcel_row.numero,
            "act_number": act_number,
        });
        self.notify_parties(
            RegistryEvent::TransactionApproved,
            &new_owner.row,
            previous_owner.as_ref().map(|c| &c.row),
            payload,
        );

        Ok(approved)
    }

    /// Reject a PENDING transaction, restoring the parcel to its exact
    /// pre-propose status and owner.
    pub async fn reject(
        &self,
        transaction_id: Uuid,
        agent_id: Uuid,
        reason: &str,
    ) -> RegistryResult<Transaction> {
        let now = Utc::now();

        let tx = self.load_pending(transaction_id).await?;
        let parcel = self.load_parcel(tx.row.parcel_id).await?;
        self.ensure_not_disputed(&parcel.row, restore_target(&parcel.row))?;
        let (agent, agent_user) = self.active_agent(agent_id).await?;
        let new_owner = self.load_citizen(tx.row.new_owner).await?;

        let Versioned {
            row: mut parcel_row,
            version: parcel_version,
        } = parcel;
        let parcel_before = parcel_row.clone();
        self.lifecycle.restore_after_transaction(&mut parcel_row, now)?;

        let mut rejected = tx.row.clone();
        rejected.status = TransactionStatus::Rejected;
        rejected.validating_agent = Some(agent.agent_id);
        rejected.validated_at = Some(now);
        rejected.decision_reason = Some(reason.to_string());

        let mut uow = UnitOfWork::new();
        uow.update_transaction(rejected.clone(), tx.version);
        uow.update_parcel(parcel_row.clone(), parcel_version);
        uow.append_audit(
            AuditEntry::transition(
                agent_user.user_id,
                "transaction.reject",
                EntityKind::Transaction,
                rejected.transaction_id,
                Some(&tx.row),
                &rejected,
                now,
            )
            .with_note(reason),
        );
        uow.append_audit(AuditEntry::transition(
            agent_user.user_id,
            "parcel.restore",
            EntityKind::Parcel,
            parcel_row.parcel_id,
            Some(&parcel_before),
            &parcel_row,
            now,
        ));
        self.store.commit(uow).await?;

        info!(
            transaction = %rejected.transaction_id,
            numero = %parcel_row.numero,
            reason,
            "transaction rejected"
        );

        let payload = json!({
            "transaction_id": rejected.transaction_id,
            "parcel": parcel_row.numero,
            "reason": reason,
        });
        self.notify_parties(RegistryEvent::TransactionRejected, &new_owner.row, None, payload);

        Ok(rejected)
    }

    /// Cancel a PENDING transaction. Permitted for the proposer or an
    /// ADMIN; no validation fields are set.
    pub async fn cancel(
        &self,
        transaction_id: Uuid,
        requesting_user: Uuid,
    ) -> RegistryResult<Transaction> {
        let now = Utc::now();

        let tx = self.load_pending(transaction_id).await?;
        let requester = self.load_user(requesting_user).await?;
        if requesting_user != tx.row.proposed_by && requester.row.role != UserRole::Admin {
            return Err(RegistryError::Authorization(
                "only the proposer or an administrator may cancel a pending transaction".into(),
            ));
        }

        let parcel = self.load_parcel(tx.row.parcel_id).await?;
        self.ensure_not_disputed(&parcel.row, restore_target(&parcel.row))?;
        let new_owner = self.load_citizen(tx.row.new_owner).await?;

        let Versioned {
            row: mut parcel_row,
            version: parcel_version,
        } = parcel;
        let parcel_before = parcel_row.clone();
        self.lifecycle.restore_after_transaction(&mut parcel_row, now)?;

        let mut cancelled = tx.row.clone();
        cancelled.status = TransactionStatus::Cancelled;

        let mut uow = UnitOfWork::new();
        uow.update_transaction(cancelled.clone(), tx.version);
        uow.update_parcel(parcel_row.clone(), parcel_version);
        uow.append_audit(AuditEntry::transition(
            requesting_user,
            "transaction.cancel",
            EntityKind::Transaction,
            cancelled.transaction_id,
            Some(&tx.row),
            &cancelled,
            now,
        ));
        uow.append_audit(AuditEntry::transition(
            requesting_user,
            "parcel.restore",
            EntityKind::Parcel,
            parcel_row.parcel_id,
            Some(&parcel_before),
            &parcel_row,
            now,
        ));
        self.store.commit(uow).await?;

        info!(
            transaction = %cancelled.transaction_id,
            numero = %parcel_row.numero,
            "transaction cancelled"
        );

        let payload = json!({
            "transaction_id": cancelled.transaction_id,
            "parcel": parcel_row.numero,
        });
        self.notify_parties(RegistryEvent::TransactionCancelled, &new_owner.row, None, payload);

        Ok(cancelled)
    }

    // ── Guards and loads ──

    async fn load_pending(&self, transaction_id: Uuid) -> RegistryResult<Versioned<Transaction>> {
        let tx = self
            .store
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Transaction, transaction_id))?;
        if tx.row.status.is_terminal() {
            return Err(RegistryError::invalid_transition(
                EntityKind::Transaction,
                format!(
                    "transaction {} is already {}",
                    transaction_id, tx.row.status
                ),
            ));
        }
        Ok(tx)
    }

    /// While a dispute holds the parcel, the pending transaction is
    /// frozen: mutating it would invalidate the prior status the dispute
    /// recorded for restoration.
    fn ensure_not_disputed(&self, parcel: &Parcel, requested: ParcelStatus) -> RegistryResult<()> {
        if parcel.status == ParcelStatus::InDispute {
            return Err(RegistryError::InvalidParcelState {
                numero: parcel.numero.clone(),
                current: parcel.status,
                requested,
            });
        }
        Ok(())
    }

    async fn active_agent(&self, agent_id: Uuid) -> RegistryResult<(Agent, User)> {
        let agent = self
            .store
            .agent(agent_id)
            .await?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Agent, agent_id))?;
        let user = self.load_user(agent.row.user_id).await?;
        if !agent.row.is_active() {
            return Err(RegistryError::Authorization(format!(
                "agent {} is {}",
                agent.row.registration_number, agent.row.status
            )));
        }
        if !user.row.is_active() {
            return Err(RegistryError::Authorization(format!(
                "account {} is {}",
                user.row.email, user.row.status
            )));
        }
        Ok((agent.row, user.row))
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

    fn notify_parties(
        &self,
        event: RegistryEvent,
        new_owner: &Citizen,
        previous_owner: Option<&Citizen>,
        payload: serde_json::Value,
    ) {
        self.notifier.notify(Notice {
            event,
            target_user: new_owner.user_id,
            payload: payload.clone(),
        });
        if let Some(prev) = previous_owner {
            self.notifier.notify(Notice {
                event,
                target_user: prev.user_id,
                payload,
            });
        }
    }
}

/// The status a rejection or cancellation would restore: AVAILABLE for an
/// unowned parcel, OCCUPIED otherwise.
fn restore_target(parcel: &Parcel) -> ParcelStatus {
    match parcel.current_owner {
        Some(_) => ParcelStatus::Occupied,
        None => ParcelStatus::Available,
    }
}
