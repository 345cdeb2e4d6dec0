//! Shared fixture: a seeded in-memory registry with both engines wired.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use foncier_core::model::{
    AccountStatus, Agent, AgentStatus, Citizen, LandType, Parcel, ParcelStatus, Region, User,
    UserRole,
};
use foncier_core::notify::{ChannelNotifier, Notice};
use foncier_core::store::memory::MemoryStore;
use foncier_core::store::{RegistryStore, UnitOfWork};
use foncier_core::{DisputeEngine, ParcelLifecycle, TransactionEngine};

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub transactions: TransactionEngine,
    pub disputes: DisputeEngine,
    pub lifecycle: ParcelLifecycle,
    pub notices: UnboundedReceiver<Notice>,

    pub admin_user: Uuid,
    pub agent_id: Uuid,
    pub agent_user: Uuid,
    pub inactive_agent_id: Uuid,
    pub suspended_user: Uuid,

    pub c1: Uuid,
    pub c1_user: Uuid,
    pub c2: Uuid,
    pub c2_user: Uuid,
    pub c3: Uuid,
    pub c3_user: Uuid,

    /// AVAILABLE, no owner.
    pub p1: Uuid,
    /// OCCUPIED, owned by c2.
    pub p2: Uuid,
}

pub fn user(name: &str, role: UserRole, status: AccountStatus) -> User {
    User {
        user_id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: format!("{}@registry.test", name.to_lowercase().replace(' ', ".")),
        role,
        status,
        created_at: Utc::now(),
    }
}

pub fn citizen(user_id: Uuid, national_id: &str) -> Citizen {
    Citizen {
        citizen_id: Uuid::new_v4(),
        user_id,
        national_id: national_id.to_string(),
        phone: None,
    }
}

pub fn agent(user_id: Uuid, registration: &str, status: AgentStatus) -> Agent {
    Agent {
        agent_id: Uuid::new_v4(),
        user_id,
        registration_number: registration.to_string(),
        region_code: "LIT".to_string(),
        status,
    }
}

pub fn parcel(numero: &str, status: ParcelStatus, owner: Option<Uuid>) -> Parcel {
    Parcel {
        parcel_id: Uuid::new_v4(),
        numero: numero.to_string(),
        area_m2: 500.0,
        land_type: LandType::Residential,
        status,
        current_owner: owner,
        region_code: "LIT".to_string(),
        address: Some("Rue des Cocotiers".to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn setup() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn RegistryStore> = store.clone();

    let (notifier, notices) = ChannelNotifier::new();
    let notifier = Arc::new(notifier);

    let lifecycle = ParcelLifecycle::new(dyn_store.clone());
    let transactions =
        TransactionEngine::new(dyn_store.clone(), lifecycle.clone(), notifier.clone());
    let disputes = DisputeEngine::new(dyn_store.clone(), lifecycle.clone(), notifier);

    let admin = user("Registry Admin", UserRole::Admin, AccountStatus::Active);
    let agent_acct = user("Agent Ndiaye", UserRole::Agent, AccountStatus::Active);
    let inactive_acct = user("Agent Dormant", UserRole::Agent, AccountStatus::Active);
    let u1 = user("Awa Diop", UserRole::Citizen, AccountStatus::Active);
    let u2 = user("Moussa Fall", UserRole::Citizen, AccountStatus::Active);
    let u3 = user("Fatou Sarr", UserRole::Citizen, AccountStatus::Active);
    let suspended = user("Blocked Citizen", UserRole::Citizen, AccountStatus::Suspended);

    let ag = agent(agent_acct.user_id, "AG-001", AgentStatus::Active);
    let inactive_ag = agent(inactive_acct.user_id, "AG-002", AgentStatus::Inactive);
    let c1 = citizen(u1.user_id, "SN-0001");
    let c2 = citizen(u2.user_id, "SN-0002");
    let c3 = citizen(u3.user_id, "SN-0003");

    let p1 = parcel("LIT-1001", ParcelStatus::Available, None);
    let p2 = parcel("LIT-1002", ParcelStatus::Occupied, Some(c2.citizen_id));

    let fixture = Fixture {
        admin_user: admin.user_id,
        agent_id: ag.agent_id,
        agent_user: agent_acct.user_id,
        inactive_agent_id: inactive_ag.agent_id,
        suspended_user: suspended.user_id,
        c1: c1.citizen_id,
        c1_user: u1.user_id,
        c2: c2.citizen_id,
        c2_user: u2.user_id,
        c3: c3.citizen_id,
        c3_user: u3.user_id,
        p1: p1.parcel_id,
        p2: p2.parcel_id,
        store: store.clone(),
        transactions,
        disputes,
        lifecycle,
        notices,
    };

    let mut uow = UnitOfWork::new();
    uow.insert_region(Region::new("LIT", "Littoral"));
    for u in [admin, agent_acct, inactive_acct, u1, u2, u3, suspended] {
        uow.insert_user(u);
    }
    uow.insert_agent(ag);
    uow.insert_agent(inactive_ag);
    for c in [c1, c2, c3] {
        uow.insert_citizen(c);
    }
    uow.insert_parcel(p1);
    uow.insert_parcel(p2);
    store.commit(uow).await.expect("seed commit");

    fixture
}

/// Check the cross-record invariants for one parcel: the status agrees
/// with the existence of a pending transaction and of active disputes.
pub async fn assert_parcel_invariants(store: &MemoryStore, parcel_id: Uuid) {
    let parcel = store
        .parcel(parcel_id)
        .await
        .unwrap()
        .expect("parcel exists");
    let pending = store.pending_transaction_for(parcel_id).await.unwrap();
    let active = store.active_disputes_for(parcel_id).await.unwrap();
    let all = store.transactions_for_parcel(parcel_id).await.unwrap();
    let pending_count = all
        .iter()
        .filter(|t| !t.status.is_terminal())
        .count();

    match parcel.row.status {
        ParcelStatus::InTransaction => {
            assert_eq!(pending_count, 1, "IN_TRANSACTION needs exactly one PENDING");
            assert!(pending.is_some());
            assert!(active.is_empty(), "IN_TRANSACTION excludes active disputes");
        }
        ParcelStatus::InDispute => {
            assert!(!active.is_empty(), "IN_DISPUTE needs an active dispute");
            if pending.is_some() {
                // The hold must have been recorded over an in-flight
                // transaction, never over a settled parcel.
                assert_eq!(
                    active[0].row.previous_parcel_status,
                    ParcelStatus::InTransaction
                );
            }
        }
        ParcelStatus::Available | ParcelStatus::Occupied | ParcelStatus::Reserved => {
            assert!(pending.is_none(), "settled parcel may not hold a PENDING");
            assert!(active.is_empty());
        }
    }
}
