use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub supabase_url: String,
    #[serde(skip_serializing)]
    pub supabase_anon_key: String,
    #[serde(skip_serializing)]
    pub supabase_service_role_key: String,
    pub store_timeout_ms: u64,
    pub lock_timeout_ms: u64,
    pub min_change_notice_hours: i64,
    pub default_session_minutes: i64,
    pub default_currency: String,
    pub alternative_slot_count: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            store_timeout_ms: 5_000,
            lock_timeout_ms: 10_000,
            min_change_notice_hours: 2,
            default_session_minutes: 50,
            default_currency: "EUR".to_string(),
            alternative_slot_count: 3,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) before reading the environment.
    pub fn from_dotenv() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            store_timeout_ms: parse_or("SCHEDULING_STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            lock_timeout_ms: parse_or("SCHEDULING_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            min_change_notice_hours: parse_or(
                "SCHEDULING_MIN_CHANGE_NOTICE_HOURS",
                defaults.min_change_notice_hours,
            ),
            default_session_minutes: parse_or(
                "SCHEDULING_DEFAULT_SESSION_MINUTES",
                defaults.default_session_minutes,
            ),
            default_currency: env::var("SCHEDULING_DEFAULT_CURRENCY")
                .unwrap_or(defaults.default_currency),
            alternative_slot_count: parse_or(
                "SCHEDULING_ALTERNATIVE_SLOTS",
                defaults.alternative_slot_count,
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
