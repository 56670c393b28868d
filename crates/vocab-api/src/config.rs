use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::store::MergePolicy;

const MIN_JWT_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub merge_policy: MergePolicy,
    pub max_changes_per_request: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("merge_policy", &self.merge_policy)
            .field("max_changes_per_request", &self.max_changes_per_request)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "VOCAB_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            value_or_default(&lookup, "VOCAB_API_DATABASE_PATH", "vocab-sync.db");

        let jwt_secret = required_trimmed(&lookup, "SYNC_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::Invalid(format!(
                "SYNC_JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }
        let jwt_issuer = optional_trimmed(&lookup, "SYNC_JWT_ISSUER");

        let auth_clock_skew_secs = value_or_default(&lookup, "AUTH_CLOCK_SKEW_SECS", "60")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "AUTH_CLOCK_SKEW_SECS must be an integer in [0, 300]".to_string(),
                )
            })?;
        if auth_clock_skew_secs > 300 {
            return Err(ConfigError::Invalid(
                "AUTH_CLOCK_SKEW_SECS must be in [0, 300]".to_string(),
            ));
        }

        let merge_policy = value_or_default(&lookup, "SYNC_MERGE_POLICY", "newest-wins")
            .parse::<MergePolicy>()
            .map_err(ConfigError::Invalid)?;

        let max_changes_per_request =
            value_or_default(&lookup, "SYNC_MAX_CHANGES_PER_REQUEST", "5000")
                .parse::<usize>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "SYNC_MAX_CHANGES_PER_REQUEST must be an integer in [1, 50000]"
                            .to_string(),
                    )
                })?;
        if !(1..=50_000).contains(&max_changes_per_request) {
            return Err(ConfigError::Invalid(
                "SYNC_MAX_CHANGES_PER_REQUEST must be in [1, 50000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            merge_policy,
            max_changes_per_request,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_jwt_secret() {
        let err = config_from(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("SYNC_JWT_SECRET"));
    }

    #[test]
    fn config_rejects_short_secret() {
        let map = HashMap::from([("SYNC_JWT_SECRET", "too-short")]);
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn config_defaults() {
        let map = HashMap::from([("SYNC_JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, "vocab-sync.db");
        assert_eq!(config.merge_policy, MergePolicy::NewestWins);
        assert_eq!(config.max_changes_per_request, 5_000);
        assert_eq!(config.auth_clock_skew, Duration::from_secs(60));
        assert!(config.jwt_issuer.is_none());
    }

    #[test]
    fn config_parses_merge_policy_and_limits() {
        let map = HashMap::from([
            ("SYNC_JWT_SECRET", SECRET),
            ("SYNC_MERGE_POLICY", "last-pusher-wins"),
            ("SYNC_MAX_CHANGES_PER_REQUEST", "10"),
        ]);
        let config = config_from(&map).unwrap();
        assert_eq!(config.merge_policy, MergePolicy::LastPusherWins);
        assert_eq!(config.max_changes_per_request, 10);

        let map = HashMap::from([("SYNC_JWT_SECRET", SECRET), ("SYNC_MERGE_POLICY", "random")]);
        assert!(config_from(&map).is_err());

        let map = HashMap::from([
            ("SYNC_JWT_SECRET", SECRET),
            ("SYNC_MAX_CHANGES_PER_REQUEST", "0"),
        ]);
        assert!(config_from(&map).is_err());
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let map = HashMap::from([("SYNC_JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(SECRET));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
