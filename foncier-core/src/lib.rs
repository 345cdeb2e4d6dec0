//! foncier-core — consistency engine for a land registry.
//!
//! Records parcels, their ownership, and the transactions and disputes
//! that change ownership or encumber a parcel. The engines enforce the
//! invariants that span records:
//!
//! - a parcel is IN_TRANSACTION exactly while one PENDING transaction
//!   references it, and IN_DISPUTE exactly while at least one active
//!   dispute does;
//! - ownership transfer, parcel status update and audit recording commit
//!   as one atomic unit of work, or not at all;
//! - concurrent actors racing on the same row are resolved by an
//!   optimistic version check at commit time — exactly one wins, the
//!   loser gets a typed error and decides whether to retry.
//!
//! Storage ([`store::RegistryStore`]) and notification delivery
//! ([`notify::Notifier`]) are ports: the engines are constructed over
//! `Arc<dyn …>` handles owned by the hosting process.

pub mod disputes;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod store;
pub mod transactions;

pub use disputes::{DisputeEngine, OpenDispute};
pub use error::{RegistryError, RegistryResult};
pub use lifecycle::ParcelLifecycle;
pub use notify::{Notice, Notifier, RegistryEvent};
pub use store::{RegistryStore, StoreError, UnitOfWork, Versioned};
pub use transactions::{ProposeTransaction, TransactionEngine};
