// ABOUTME: Environment-driven server configuration
// ABOUTME: Ports, database path, notice base URL and scheduler cadence

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number in {0}: {1}")]
    InvalidNumber(&'static str, ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub notice_base_url: String,
    pub cors_origin: String,
    pub reminder_interval_secs: u64,
    pub expiry_interval_secs: u64,
    pub reminder_window_days: i64,
}

fn parse_env<T: std::str::FromStr<Err = ParseIntError>>(
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidNumber(key, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = parse_env("PORT", 4820)?;
        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let database_path = env::var("SAMMATI_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/sammati.db"));

        let notice_base_url = env::var("NOTICE_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(Config {
            port,
            database_path,
            notice_base_url,
            cors_origin,
            reminder_interval_secs: parse_env("REMINDER_INTERVAL_SECS", 3600u64)?,
            expiry_interval_secs: parse_env("EXPIRY_INTERVAL_SECS", 300u64)?,
            reminder_window_days: parse_env("REMINDER_WINDOW_DAYS", 7i64)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_env() {
        // Only assert on keys unlikely to be set in a test environment
        let config = Config::from_env().unwrap();
        assert_eq!(config.reminder_window_days, 7);
        assert!(config.notice_base_url.starts_with("http"));
    }
}
