//! Dispute workflow: the IN_DISPUTE hold, prior-status restoration, the
//! freeze it places on pending transactions, and multi-dispute parcels.

mod common;

use common::{assert_parcel_invariants, setup};

use rust_decimal::Decimal;

use foncier_core::model::{
    DisputeStatus, DisputeType, ParcelStatus, TransactionStatus, TransactionType,
};
use foncier_core::store::RegistryStore;
use foncier_core::{OpenDispute, ProposeTransaction, RegistryError};

fn boundary_dispute(fx: &common::Fixture) -> OpenDispute {
    OpenDispute {
        parcel_id: fx.p2,
        complainant: fx.c3,
        defendant: Some(fx.c2),
        kind: DisputeType::Boundary,
        description: "fence encroaches on the neighbouring lot".to_string(),
    }
}

fn sale_on_p1(fx: &common::Fixture) -> ProposeTransaction {
    ProposeTransaction {
        parcel_id: fx.p1,
        kind: TransactionType::Sale,
        new_owner: fx.c1,
        previous_owner: None,
        amount: Decimal::from(1_000_000i64),
        proposed_by: fx.c1_user,
    }
}

#[tokio::test]
async fn open_records_prior_status_and_blocks_propose() {
    let fx = setup().await;

    let dispute = fx.disputes.open(boundary_dispute(&fx)).await.unwrap();
    assert_eq!(dispute.status, DisputeStatus::Open);
    assert_eq!(dispute.previous_parcel_status, ParcelStatus::Occupied);

    let parcel = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::InDispute);
    assert_parcel_invariants(&fx.store, fx.p2).await;

    // No new transaction may enter while disputed.
    let err = fx
        .transactions
        .propose(ProposeTransaction {
            parcel_id: fx.p2,
            kind: TransactionType::Sale,
            new_owner: fx.c1,
            previous_owner: Some(fx.c2),
            amount: Decimal::ZERO,
            proposed_by: fx.c2_user,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::InvalidParcelState {
            current: ParcelStatus::InDispute,
            ..
        }
    ));

    // Resolution restores the recorded status, owner untouched.
    let resolved = fx
        .disputes
        .resolve(dispute.dispute_id, fx.agent_user, "boundary confirmed by survey")
        .await
        .unwrap();
    assert_eq!(resolved.status, DisputeStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let parcel = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::Occupied);
    assert_eq!(parcel.row.current_owner, Some(fx.c2));
    assert_parcel_invariants(&fx.store, fx.p2).await;
}

#[tokio::test]
async fn dispute_freezes_pending_transaction_until_cleared() {
    let fx = setup().await;

    let tx = fx.transactions.propose(sale_on_p1(&fx)).await.unwrap();

    let dispute = fx
        .disputes
        .open(OpenDispute {
            parcel_id: fx.p1,
            complainant: fx.c3,
            defendant: None,
            kind: DisputeType::Ownership,
            description: "claims inheritance rights over the lot".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(dispute.previous_parcel_status, ParcelStatus::InTransaction);

    // The pending transaction survives the dispute...
    let pending = fx.store.pending_transaction_for(fx.p1).await.unwrap();
    assert!(pending.is_some());
    assert_parcel_invariants(&fx.store, fx.p1).await;

    // ...but cannot be decided or withdrawn while the hold lasts.
    for result in [
        fx.transactions.approve(tx.transaction_id, fx.agent_id).await,
        fx.transactions
            .reject(tx.transaction_id, fx.agent_id, "try anyway")
            .await,
        fx.transactions.cancel(tx.transaction_id, fx.c1_user).await,
    ] {
        assert!(matches!(
            result,
            Err(RegistryError::InvalidParcelState {
                current: ParcelStatus::InDispute,
                ..
            })
        ));
    }

    // Clearing the dispute puts the parcel back IN_TRANSACTION.
    fx.disputes
        .resolve(dispute.dispute_id, fx.agent_user, "claim dismissed")
        .await
        .unwrap();
    let parcel = fx.store.parcel(fx.p1).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::InTransaction);
    assert_parcel_invariants(&fx.store, fx.p1).await;

    // And the frozen transaction is decidable again.
    let approved = fx
        .transactions
        .approve(tx.transaction_id, fx.agent_id)
        .await
        .unwrap();
    assert_eq!(approved.status, TransactionStatus::Approved);
    let parcel = fx.store.parcel(fx.p1).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::Occupied);
    assert_eq!(parcel.row.current_owner, Some(fx.c1));
}

#[tokio::test]
async fn last_active_dispute_clears_the_parcel() {
    let fx = setup().await;

    let first = fx.disputes.open(boundary_dispute(&fx)).await.unwrap();
    let second = fx
        .disputes
        .open(OpenDispute {
            parcel_id: fx.p2,
            complainant: fx.c1,
            defendant: Some(fx.c2),
            kind: DisputeType::Usage,
            description: "commercial use of residential land".to_string(),
        })
        .await
        .unwrap();

    // The second dispute copies the true pre-dispute status, not
    // IN_DISPUTE.
    assert_eq!(second.previous_parcel_status, ParcelStatus::Occupied);

    // Resolving one of two leaves the parcel disputed.
    fx.disputes
        .resolve(first.dispute_id, fx.agent_user, "boundary fixed")
        .await
        .unwrap();
    let parcel = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::InDispute);
    assert_parcel_invariants(&fx.store, fx.p2).await;

    // Resolving the last one restores it.
    fx.disputes
        .resolve(second.dispute_id, fx.agent_user, "usage regularized")
        .await
        .unwrap();
    let parcel = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::Occupied);
    assert_parcel_invariants(&fx.store, fx.p2).await;
}

#[tokio::test]
async fn withdrawal_closes_open_dispute_directly() {
    let fx = setup().await;

    let dispute = fx.disputes.open(boundary_dispute(&fx)).await.unwrap();
    let closed = fx
        .disputes
        .close(dispute.dispute_id, fx.c3_user, Some("withdrawn by complainant"))
        .await
        .unwrap();
    assert_eq!(closed.status, DisputeStatus::Closed);
    assert_eq!(closed.resolution.as_deref(), Some("withdrawn by complainant"));

    let parcel = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel.row.status, ParcelStatus::Occupied);
    assert_parcel_invariants(&fx.store, fx.p2).await;

    // Closed is terminal.
    assert!(matches!(
        fx.disputes.close(dispute.dispute_id, fx.c3_user, None).await,
        Err(RegistryError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn assignment_moves_open_to_in_progress() {
    let fx = setup().await;

    let dispute = fx.disputes.open(boundary_dispute(&fx)).await.unwrap();

    // An inactive agent may not take the case.
    assert!(matches!(
        fx.disputes
            .assign(dispute.dispute_id, fx.inactive_agent_id, fx.admin_user)
            .await,
        Err(RegistryError::Authorization(_))
    ));

    let assigned = fx
        .disputes
        .assign(dispute.dispute_id, fx.agent_id, fx.admin_user)
        .await
        .unwrap();
    assert_eq!(assigned.status, DisputeStatus::InProgress);
    assert_eq!(assigned.assigned_agent, Some(fx.agent_id));

    // Re-assignment while in progress keeps the status.
    let reassigned = fx
        .disputes
        .assign(dispute.dispute_id, fx.agent_id, fx.admin_user)
        .await
        .unwrap();
    assert_eq!(reassigned.status, DisputeStatus::InProgress);

    // No assignment once settled.
    fx.disputes
        .resolve(dispute.dispute_id, fx.agent_user, "done")
        .await
        .unwrap();
    assert!(matches!(
        fx.disputes
            .assign(dispute.dispute_id, fx.agent_id, fx.admin_user)
            .await,
        Err(RegistryError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn close_after_resolve_does_not_restore_twice() {
    let fx = setup().await;

    let dispute = fx.disputes.open(boundary_dispute(&fx)).await.unwrap();
    fx.disputes
        .resolve(dispute.dispute_id, fx.agent_user, "settled amicably")
        .await
        .unwrap();

    let parcel_after_resolve = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel_after_resolve.row.status, ParcelStatus::Occupied);

    let closed = fx
        .disputes
        .close(dispute.dispute_id, fx.admin_user, None)
        .await
        .unwrap();
    assert_eq!(closed.status, DisputeStatus::Closed);
    // Resolution from the resolve step is preserved.
    assert_eq!(closed.resolution.as_deref(), Some("settled amicably"));

    // The parcel row was not written again by the close.
    let parcel_after_close = fx.store.parcel(fx.p2).await.unwrap().unwrap();
    assert_eq!(parcel_after_close.version, parcel_after_resolve.version);
}

#[tokio::test]
async fn resolve_requires_an_active_dispute() {
    let fx = setup().await;

    let dispute = fx.disputes.open(boundary_dispute(&fx)).await.unwrap();
    fx.disputes
        .resolve(dispute.dispute_id, fx.agent_user, "done")
        .await
        .unwrap();

    assert!(matches!(
        fx.disputes
            .resolve(dispute.dispute_id, fx.agent_user, "again")
            .await,
        Err(RegistryError::InvalidTransition { .. })
    ));
}
