use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{FixedOffset, NaiveTime};
use dotenvy::dotenv;

use crate::service::Policy;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    /// Minutes east of UTC for the single civil timezone every date is computed in.
    pub civil_utc_offset_minutes: i32,
    pub default_radius_meters: u32,
    pub tap_in_grace_minutes: u32,
    pub reconciliation_cutoff: NaiveTime,
    pub store_timeout_ms: u64,
    pub min_justification_chars: usize,
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let cutoff = match env::var("RECONCILIATION_CUTOFF") {
            Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .with_context(|| format!("RECONCILIATION_CUTOFF must be HH:MM, got {raw}"))?,
            Err(_) => Policy::default().reconciliation_cutoff,
        };

        let config = Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            civil_utc_offset_minutes: or_default("CIVIL_UTC_OFFSET_MINUTES", 420)?,
            default_radius_meters: or_default("DEFAULT_RADIUS_METERS", 100)?,
            tap_in_grace_minutes: or_default("TAP_IN_GRACE_MINUTES", 120)?,
            reconciliation_cutoff: cutoff,
            store_timeout_ms: or_default("STORE_TIMEOUT_MS", 5000)?,
            min_justification_chars: or_default("MIN_JUSTIFICATION_CHARS", 20)?,
        };
        config.civil_offset()?;
        Ok(config)
    }

    pub fn civil_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.civil_utc_offset_minutes * 60).ok_or_else(|| {
            anyhow!(
                "CIVIL_UTC_OFFSET_MINUTES out of range: {}",
                self.civil_utc_offset_minutes
            )
        })
    }

    pub fn policy(&self) -> Policy {
        Policy {
            default_radius_meters: self.default_radius_meters,
            grace_minutes: self.tap_in_grace_minutes,
            reconciliation_cutoff: self.reconciliation_cutoff,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            min_justification_chars: self.min_justification_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            database_url: "mysql://localhost/attendance".into(),
            jwt_secret: "secret".into(),
            server_addr: "127.0.0.1:8080".into(),
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            civil_utc_offset_minutes: 420,
            default_radius_meters: 150,
            tap_in_grace_minutes: 90,
            reconciliation_cutoff: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            store_timeout_ms: 2500,
            min_justification_chars: 20,
        }
    }

    #[test]
    fn policy_carries_engine_tunables() {
        let policy = sample().policy();
        assert_eq!(policy.default_radius_meters, 150);
        assert_eq!(policy.grace_minutes, 90);
        assert_eq!(policy.store_timeout, Duration::from_millis(2500));
        assert_eq!(policy.reconciliation_cutoff, NaiveTime::from_hms_opt(23, 0, 0).unwrap());
    }

    #[test]
    fn civil_offset_is_bounded() {
        let mut config = sample();
        assert_eq!(config.civil_offset().unwrap().local_minus_utc(), 7 * 3600);
        config.civil_utc_offset_minutes = 24 * 60;
        assert!(config.civil_offset().is_err());
    }
}
