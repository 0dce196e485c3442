use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Actor, Role, User};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub store_timeout_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            store_timeout_ms: 2_000,
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            store_timeout_ms: self.store_timeout_ms,
            ..AppConfig::default()
        }
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl TestUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        }
    }

    pub fn professional(email: &str) -> Self {
        Self::new(email, Role::Professional)
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, Role::Patient)
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, Role::Admin)
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, Role::Receptionist)
    }

    pub fn to_actor(&self) -> Actor {
        Actor::new(self.id, self.role).with_email(self.email.clone())
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.to_string(),
            email: Some(self.email.clone()),
            role: Some(self.role.to_string()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

/// Row shapes returned by the PostgREST directory tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_response(patient_id: Uuid, email: &str, first_name: &str, last_name: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "first_name": first_name,
            "last_name": last_name,
            "email": email,
            "phone": "+34600000000",
            "date_of_birth": "1990-01-01",
            "emergency_contact": {
                "name": "Emergency Contact",
                "phone": "+34600000001",
                "relationship": "sibling"
            }
        })
    }

    pub fn professional_response(professional_id: Uuid, email: &str, first_name: &str, last_name: &str) -> serde_json::Value {
        json!({
            "id": professional_id,
            "first_name": first_name,
            "last_name": last_name,
            "email": email
        })
    }

    pub fn service_response(service_id: Uuid, name: &str, default_duration_minutes: Option<i64>, base_price: f64) -> serde_json::Value {
        json!({
            "id": service_id,
            "name": name,
            "default_duration_minutes": default_duration_minutes,
            "base_price": base_price,
            "currency": "EUR"
        })
    }

    pub fn room_response(room_id: Uuid, name: &str) -> serde_json::Value {
        json!({
            "id": room_id,
            "name": name
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(app_config.is_configured());
        assert_eq!(app_config.default_session_minutes, 50);
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::professional("therapist@example.com");
        assert_eq!(user.role, Role::Professional);

        let actor = user.to_actor();
        assert_eq!(actor.id, user.id);
        assert_eq!(actor.email.as_deref(), Some("therapist@example.com"));

        let user_model = user.to_user();
        assert_eq!(user_model.role.as_deref(), Some("professional"));
        assert_eq!(Actor::try_from(&user_model).unwrap(), actor);
    }
}
