//! Documents and notifications.
//!
//! Both are plain repository rows from the engine's point of view: the
//! engines create them but never interpret them. File bytes and delivery
//! channels belong to external collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Act materializing an approved transaction.
    Act,
    Deed,
    SurveyPlan,
    Judgment,
    Identity,
    Other,
}

/// A document attached to a parcel, transaction or dispute. `reference`
/// points into the external document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: Uuid,
    pub owner_kind: EntityKind,
    pub owner_id: Uuid,
    pub kind: DocumentKind,
    pub title: String,
    pub reference: String,
    pub added_at: DateTime<Utc>,
}

/// A user-facing notification row, materialized by the store-backed
/// notifier. Delivery is out of scope; `read` is for the consuming surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
