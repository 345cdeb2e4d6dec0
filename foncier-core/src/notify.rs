//! Notification port.
//!
//! The engines emit events here strictly *after* a successful commit,
//! fire-and-forget: a slow or failing notifier can never block or fail the
//! operation that produced the event. Delivery to the user is an external
//! concern.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::model::Notification;
use crate::store::{RegistryStore, UnitOfWork};

/// Events the registry emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryEvent {
    TransactionProposed,
    TransactionApproved,
    TransactionRejected,
    TransactionCancelled,
    DisputeOpened,
    DisputeAssigned,
    DisputeResolved,
    DisputeClosed,
}

impl RegistryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryEvent::TransactionProposed => "transaction.proposed",
            RegistryEvent::TransactionApproved => "transaction.approved",
            RegistryEvent::TransactionRejected => "transaction.rejected",
            RegistryEvent::TransactionCancelled => "transaction.cancelled",
            RegistryEvent::DisputeOpened => "dispute.opened",
            RegistryEvent::DisputeAssigned => "dispute.assigned",
            RegistryEvent::DisputeResolved => "dispute.resolved",
            RegistryEvent::DisputeClosed => "dispute.closed",
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event addressed to one user.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub event: RegistryEvent,
    pub target_user: Uuid,
    pub payload: serde_json::Value,
}

/// Receives events from the engines. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Drops every notice. Useful for batch jobs and tests that do not
/// observe notifications.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notice: Notice) {}
}

/// Forwards notices onto an unbounded channel for an out-of-process
/// delivery worker to drain.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            warn!("notification channel closed, notice dropped");
        }
    }
}

/// Materializes each notice as a [`Notification`] row, in its own commit
/// outside the emitting operation's atomic unit. Requires a tokio runtime.
pub struct StoreNotifier {
    store: Arc<dyn RegistryStore>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }
}

impl Notifier for StoreNotifier {
    fn notify(&self, notice: Notice) {
        let store = self.store.clone();
        let row = Notification {
            notification_id: Uuid::new_v4(),
            user_id: notice.target_user,
            event: notice.event.as_str().to_string(),
            payload: notice.payload,
            created_at: Utc::now(),
            read: false,
        };
        tokio::spawn(async move {
            let mut uow = UnitOfWork::new();
            uow.insert_notification(row);
            if let Err(e) = store.commit(uow).await {
                warn!(error = %e, "failed to persist notification");
            }
        });
    }
}
