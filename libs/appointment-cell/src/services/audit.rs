// libs/appointment-cell/src/services/audit.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use shared_models::auth::Actor;
use shared_models::error::StoreError;

use crate::models::{
    Appointment, AuditAction, AuditClassification, AuditLogEntry, ChangeType, FieldChange,
    RelatedEntity, RelatedKind, RiskLevel,
};
use crate::services::clock::Clock;
use crate::store::AuditLogStore;

const ENTITY_TYPE: &str = "appointment";

/// Bookkeeping fields left out of update diffs.
const IGNORED_FIELDS: &[&str] = &["updated_at"];

/// Fields holding protected health information.
const PHI_FIELDS: &[&str] = &["notes", "patient_info"];

pub struct AuditTrailRecorder {
    store: Arc<dyn AuditLogStore>,
    clock: Arc<dyn Clock>,
}

impl AuditTrailRecorder {
    pub fn new(store: Arc<dyn AuditLogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Classification for `action`; GDPR relevance of a plain update depends
    /// on whether any PHI field is among `changes`.
    pub fn classify(action: AuditAction, changes: &[FieldChange]) -> AuditClassification {
        AuditClassification::for_action(action, phi_changed(changes))
    }

    /// Append one entry for a mutation of `appointment`.
    pub async fn record(
        &self,
        action: AuditAction,
        appointment: &Appointment,
        actor: &Actor,
        changes: Vec<FieldChange>,
        classification: AuditClassification,
        reason: Option<String>,
    ) -> Result<AuditLogEntry, StoreError> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            action,
            entity_type: ENTITY_TYPE.to_string(),
            entity_id: appointment.id,
            actor_id: actor.id,
            actor_type: actor.role,
            timestamp: self.clock.now(),
            changes,
            risk_level: classification.risk_level,
            compliance: classification.compliance,
            retention: classification.retention,
            related: vec![
                RelatedEntity { kind: RelatedKind::Patient, id: appointment.patient_id },
                RelatedEntity { kind: RelatedKind::Professional, id: appointment.professional_id },
                RelatedEntity { kind: RelatedKind::User, id: actor.id },
            ],
            reason,
        };

        self.store.append(&entry).await?;

        info!(
            audit_id = %entry.id,
            action = %entry.action,
            appointment_id = %entry.entity_id,
            actor_id = %entry.actor_id,
            actor_type = %entry.actor_type,
            changes = entry.changes.len(),
            "Audit entry recorded"
        );
        if entry.risk_level == RiskLevel::High {
            warn!(
                "HIGH-RISK audit event: {} on appointment {} by {} ({})",
                entry.action, entry.entity_id, entry.actor_id, entry.actor_type
            );
        }

        Ok(entry)
    }
}

/// Field-by-field diff of two serialized states. Nested objects are
/// flattened to dotted paths; `null` counts as absent.
pub fn diff_changes(before: &Value, after: &Value) -> Vec<FieldChange> {
    let mut old_fields = BTreeMap::new();
    let mut new_fields = BTreeMap::new();
    flatten("", before, &mut old_fields);
    flatten("", after, &mut new_fields);

    let mut keys: Vec<&String> = old_fields.keys().chain(new_fields.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|key| !IGNORED_FIELDS.contains(&key.as_str()))
        .filter_map(|key| {
            let change = match (old_fields.get(key), new_fields.get(key)) {
                (Some(old), Some(new)) if old == new => return None,
                (Some(old), Some(new)) => (old.clone(), new.clone(), ChangeType::Modified),
                (Some(old), None) => (old.clone(), Value::Null, ChangeType::Removed),
                (None, Some(new)) => (Value::Null, new.clone(), ChangeType::Added),
                (None, None) => return None,
            };
            Some(FieldChange {
                field: key.clone(),
                old_value: change.0,
                new_value: change.1,
                change_type: change.2,
            })
        })
        .collect()
}

/// Serialize both states and diff them.
pub fn diff_appointments(before: &Appointment, after: &Appointment) -> Result<Vec<FieldChange>, StoreError> {
    Ok(diff_changes(&serde_json::to_value(before)?, &serde_json::to_value(after)?))
}

/// Every field of a new appointment, reported as added.
pub fn creation_changes(appointment: &Appointment) -> Result<Vec<FieldChange>, StoreError> {
    Ok(diff_changes(&Value::Null, &serde_json::to_value(appointment)?))
}

pub fn phi_changed(changes: &[FieldChange]) -> bool {
    changes.iter().any(|change| {
        PHI_FIELDS.iter().any(|phi| {
            change.field == *phi || change.field.starts_with(&format!("{}.", phi))
        })
    })
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, nested, out);
            }
        }
        Value::Null => {}
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}
