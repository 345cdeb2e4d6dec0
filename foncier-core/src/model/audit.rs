//! Audit entries.
//!
//! Append-only. Every state transition the engines commit carries one
//! entry per mutated entity, inside the same unit of work; nothing in the
//! core ever updates or deletes one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::EntityKind;

/// Immutable record of one entity mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    /// User on whose behalf the mutation ran.
    pub actor: Uuid,
    /// Dotted action name, e.g. `transaction.approve`.
    pub action: String,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    /// Structured snapshot before the mutation; `Null` for creations.
    pub old_value: Value,
    /// Structured snapshot after the mutation.
    pub new_value: Value,
    /// Free-text context, e.g. a rejection reason.
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry from before/after snapshots of a serializable row.
    /// `old` is None for creations.
    pub fn transition<T: Serialize>(
        actor: Uuid,
        action: impl Into<String>,
        entity_kind: EntityKind,
        entity_id: Uuid,
        old: Option<&T>,
        new: &T,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            actor,
            action: action.into(),
            entity_kind,
            entity_id,
            old_value: old
                .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
                .unwrap_or(Value::Null),
            new_value: serde_json::to_value(new).unwrap_or(Value::Null),
            note: None,
            recorded_at: at,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_entry_has_null_old_value() {
        let id = Uuid::new_v4();
        let entry = AuditEntry::transition(
            Uuid::new_v4(),
            "transaction.propose",
            EntityKind::Transaction,
            id,
            None::<&serde_json::Value>,
            &serde_json::json!({"status": "PENDING"}),
            Utc::now(),
        );
        assert_eq!(entry.old_value, Value::Null);
        assert_eq!(entry.new_value["status"], "PENDING");
        assert_eq!(entry.entity_id, id);
    }
}
