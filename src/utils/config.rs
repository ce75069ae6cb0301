// Centralized configuration for the music streaming service

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::features::audit::RetryPolicy;

/// Feature flag namespace owned by this plugin
pub const PLUGIN_ID: &str = "musicstreaming";

/// Broadcast topic for "settings changed" events
pub const UPDATE_TOPIC: &str = "update_musicstreaming";

/// Discord embed colors
pub mod colors {
    pub const SUCCESS: u32 = 0x2ecc71;
    pub const ERROR: u32 = 0xff0000;
    pub const WARNING: u32 = 0xffa500;
    pub const INFO: u32 = 0x3498db;
}

/// Runtime settings, read from the environment (and `.env` via dotenvy)
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    /// Service account file; the bot falls back to in-memory storage when it is missing
    pub firebase_key_path: String,
    pub audit_retry: RetryPolicy,
    pub update_deadline: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set")?;
        let firebase_key_path =
            env::var("FIREBASE_KEY_PATH").unwrap_or_else(|_| "firebase-key.json".to_string());

        let defaults = RetryPolicy::default();
        let audit_retry = RetryPolicy {
            max_attempts: parse_var("AUDIT_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_var(
                "AUDIT_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_var(
                "AUDIT_MAX_DELAY_MS",
                defaults.max_delay.as_millis() as u64,
            )?),
        };

        Ok(Self {
            discord_token,
            firebase_key_path,
            audit_retry,
            update_deadline: Duration::from_secs(parse_var("UPDATE_DEADLINE_SECS", 10)?),
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default() {
        assert_eq!(parse_var("MUSICSTREAM_TEST_UNSET_VAR", 7u32).unwrap(), 7);
    }

    #[test]
    fn test_parse_var_invalid() {
        env::set_var("MUSICSTREAM_TEST_BAD_VAR", "soon");
        assert!(parse_var("MUSICSTREAM_TEST_BAD_VAR", 1u64).is_err());
        env::remove_var("MUSICSTREAM_TEST_BAD_VAR");
    }

    #[test]
    fn test_parse_var_set() {
        env::set_var("MUSICSTREAM_TEST_GOOD_VAR", " 42 ");
        assert_eq!(parse_var("MUSICSTREAM_TEST_GOOD_VAR", 1u32).unwrap(), 42);
        env::remove_var("MUSICSTREAM_TEST_GOOD_VAR");
    }
}
