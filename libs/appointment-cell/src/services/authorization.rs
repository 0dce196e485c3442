// libs/appointment-cell/src/services/authorization.rs
use shared_models::auth::{Actor, Role};

use crate::models::{ResourceOwners, SchedulingAction};

/// Permission decision source consulted once per operation.
pub trait AuthorizationPolicy: Send + Sync {
    fn can_perform(&self, actor: &Actor, action: SchedulingAction, owners: &ResourceOwners) -> bool;
}

/// Default clinic role matrix.
///
/// - admin: everything
/// - system: everything but soft delete and compliance reads
/// - receptionist: front-desk work; no session control, deletion or audit access
/// - professional: their own appointments, minus deletion and compliance reads
/// - patient: create, view, reschedule and cancel their own appointments
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleBasedPolicy;

impl RoleBasedPolicy {
    pub fn new() -> Self {
        Self
    }

    fn is_patient_owner(actor: &Actor, owners: &ResourceOwners) -> bool {
        if owners.patient_id == Some(actor.id) {
            return true;
        }
        match (&actor.email, &owners.patient_email) {
            (Some(actor_email), Some(patient_email)) => actor_email.eq_ignore_ascii_case(patient_email),
            _ => false,
        }
    }
}

impl AuthorizationPolicy for RoleBasedPolicy {
    fn can_perform(&self, actor: &Actor, action: SchedulingAction, owners: &ResourceOwners) -> bool {
        use SchedulingAction::*;

        match actor.role {
            Role::Admin => true,
            Role::System => !matches!(action, SoftDelete | ComplianceView),
            Role::Receptionist => {
                !matches!(action, SoftDelete | ComplianceView | StartSession | EndSession | ViewAudit)
            }
            Role::Professional => {
                !matches!(action, SoftDelete | ComplianceView) && owners.professional_id == Some(actor.id)
            }
            Role::Patient => {
                matches!(action, Create | View | Reschedule | Cancel)
                    && Self::is_patient_owner(actor, owners)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn owners(patient_id: Uuid, professional_id: Uuid) -> ResourceOwners {
        ResourceOwners {
            patient_id: Some(patient_id),
            professional_id: Some(professional_id),
            patient_email: Some("ana@example.com".to_string()),
        }
    }

    #[test]
    fn only_admin_can_delete_or_read_deleted() {
        let policy = RoleBasedPolicy::new();
        let professional_id = Uuid::new_v4();
        let o = owners(Uuid::new_v4(), professional_id);
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);

        for action in [SchedulingAction::SoftDelete, SchedulingAction::ComplianceView] {
            assert!(policy.can_perform(&admin, action, &o));
            for role in [Role::System, Role::Receptionist, Role::Patient] {
                let actor = Actor::new(Uuid::new_v4(), role);
                assert!(!policy.can_perform(&actor, action, &o), "{} may not {}", role, action);
            }
            let owner = Actor::new(professional_id, Role::Professional);
            assert!(!policy.can_perform(&owner, action, &o));
        }
    }

    #[test]
    fn professional_limited_to_own_calendar() {
        let policy = RoleBasedPolicy::new();
        let professional = Actor::new(Uuid::new_v4(), Role::Professional);

        let own = owners(Uuid::new_v4(), professional.id);
        let other = owners(Uuid::new_v4(), Uuid::new_v4());

        assert!(policy.can_perform(&professional, SchedulingAction::StartSession, &own));
        assert!(!policy.can_perform(&professional, SchedulingAction::StartSession, &other));
    }

    #[test]
    fn patient_matched_by_id_or_email() {
        let policy = RoleBasedPolicy::new();
        let patient_id = Uuid::new_v4();
        let o = owners(patient_id, Uuid::new_v4());

        let by_id = Actor::new(patient_id, Role::Patient);
        let by_email = Actor::new(Uuid::new_v4(), Role::Patient).with_email("ANA@example.com");
        let stranger = Actor::new(Uuid::new_v4(), Role::Patient).with_email("bob@example.com");

        assert!(policy.can_perform(&by_id, SchedulingAction::Cancel, &o));
        assert!(policy.can_perform(&by_email, SchedulingAction::Reschedule, &o));
        assert!(!policy.can_perform(&stranger, SchedulingAction::View, &o));
        assert!(!policy.can_perform(&by_id, SchedulingAction::StartSession, &o));
    }

    #[test]
    fn receptionist_cannot_run_sessions() {
        let policy = RoleBasedPolicy::new();
        let receptionist = Actor::new(Uuid::new_v4(), Role::Receptionist);
        let o = owners(Uuid::new_v4(), Uuid::new_v4());

        assert!(policy.can_perform(&receptionist, SchedulingAction::MarkArrived, &o));
        assert!(policy.can_perform(&receptionist, SchedulingAction::Cancel, &o));
        assert!(!policy.can_perform(&receptionist, SchedulingAction::EndSession, &o));
        assert!(!policy.can_perform(&receptionist, SchedulingAction::ViewAudit, &o));
    }
}
