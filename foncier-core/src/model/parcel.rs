//! Parcels and their lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What the land is zoned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandType {
    Residential,
    Agricultural,
    Commercial,
    Industrial,
}

/// Lifecycle status of a parcel.
///
/// IN_TRANSACTION and IN_DISPUTE are *derived* holds: a parcel is
/// IN_TRANSACTION exactly while one PENDING transaction references it, and
/// IN_DISPUTE exactly while at least one OPEN/IN_PROGRESS dispute does.
/// Keeping the status and those records in agreement is the whole point of
/// the engines; nothing outside [`crate::lifecycle::ParcelLifecycle`] writes
/// this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    Available,
    Occupied,
    InTransaction,
    InDispute,
    Reserved,
}

impl ParcelStatus {
    /// True while a transaction or dispute (or a reservation) holds the
    /// parcel, i.e. a new transaction may not be proposed.
    pub fn has_active_hold(&self) -> bool {
        matches!(
            self,
            ParcelStatus::InTransaction | ParcelStatus::InDispute | ParcelStatus::Reserved
        )
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParcelStatus::Available => "AVAILABLE",
            ParcelStatus::Occupied => "OCCUPIED",
            ParcelStatus::InTransaction => "IN_TRANSACTION",
            ParcelStatus::InDispute => "IN_DISPUTE",
            ParcelStatus::Reserved => "RESERVED",
        };
        write!(f, "{s}")
    }
}

/// A unit of land administered by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub parcel_id: Uuid,
    /// Cadastral number, unique across the registry.
    pub numero: String,
    /// Surface in square metres, always > 0.
    pub area_m2: f64,
    pub land_type: LandType,
    pub status: ParcelStatus,
    /// Current owner. None for state land that has never been attributed;
    /// a RESERVED parcel may also have no owner yet.
    pub current_owner: Option<Uuid>,
    pub region_code: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped inside every committed transition (the registry's
    /// last-modification column).
    pub updated_at: DateTime<Utc>,
}
