use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub skip_threshold: u32,
    pub no_show_grace_seconds: u64,
    pub no_show_sweep_interval_seconds: u64,
    pub max_claim_attempts: u32,
    pub sequential_services: bool,
    pub default_session_minutes: i64,
    pub clinic_seed_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            skip_threshold: 3,
            no_show_grace_seconds: 300,
            no_show_sweep_interval_seconds: 30,
            max_claim_attempts: 5,
            sequential_services: false,
            default_session_minutes: 240,
            clinic_seed_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            port: parse_or("PORT", defaults.port),
            skip_threshold: parse_or("QUEUE_SKIP_THRESHOLD", defaults.skip_threshold),
            no_show_grace_seconds: parse_or(
                "QUEUE_NO_SHOW_GRACE_SECONDS",
                defaults.no_show_grace_seconds,
            ),
            no_show_sweep_interval_seconds: parse_or(
                "QUEUE_NO_SHOW_SWEEP_INTERVAL_SECONDS",
                defaults.no_show_sweep_interval_seconds,
            ),
            max_claim_attempts: parse_or("QUEUE_MAX_CLAIM_ATTEMPTS", defaults.max_claim_attempts),
            sequential_services: parse_or(
                "QUEUE_SEQUENTIAL_SERVICES",
                defaults.sequential_services,
            ),
            default_session_minutes: parse_or(
                "WORK_SESSION_DEFAULT_MINUTES",
                defaults.default_session_minutes,
            ),
            clinic_seed_path: env::var("CLINIC_SEED_PATH").ok().filter(|p| !p.is_empty()),
        };

        if !config.is_seeded() {
            warn!("CLINIC_SEED_PATH not set, catalog and staffing start empty");
        }

        config
    }

    pub fn is_seeded(&self) -> bool {
        self.clinic_seed_path.is_some()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
