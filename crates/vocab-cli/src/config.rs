//! Persistent CLI configuration and effective settings resolution.
//!
//! Values come from command-line flags first, then `VOCAB_*` environment
//! variables, then `config.json` under the platform config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vocab_core::util::{is_http_url, normalize_text_option};

use crate::error::CliError;

const APP_DIR_NAME: &str = "vocab";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "vocab.db";
const CURSOR_FILE_NAME: &str = "sync-cursor.json";

pub const SERVER_URL_ENV: &str = "VOCAB_SERVER_URL";
pub const SYNC_TOKEN_ENV: &str = "VOCAB_SYNC_TOKEN";
pub const DB_PATH_ENV: &str = "VOCAB_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn normalize_server_url(value: &str) -> Result<String, CliError> {
    let value = value.trim().trim_end_matches('/');
    if !is_http_url(value) {
        return Err(CliError::Config(format!(
            "Server URL must start with http:// or https://, got `{value}`"
        )));
    }
    Ok(value.to_string())
}

impl CliConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, CliError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    fn normalize(&mut self) {
        self.server_url = normalize_text_option(self.server_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.token = normalize_text_option(self.token.take());
        self.db_path = self
            .db_path
            .take()
            .filter(|path| !path.as_os_str().is_empty());
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub token: Option<String>,
}

/// Settings after applying flags, environment and the config file.
#[derive(Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub db_path: PathBuf,
    pub cursor_path: PathBuf,
    pub server_url: Option<String>,
    pub token: Option<String>,
}

impl std::fmt::Debug for EffectiveConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EffectiveConfig")
            .field("db_path", &self.db_path)
            .field("cursor_path", &self.cursor_path)
            .field("server_url", &self.server_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl EffectiveConfig {
    pub fn resolve(
        overrides: &Overrides,
        file: &CliConfig,
        env: impl Fn(&str) -> Option<String>,
        data_dir: &Path,
    ) -> Self {
        let default_db_path = data_dir.join(DB_FILE_NAME);
        let db_path = overrides
            .db_path
            .clone()
            .or_else(|| normalize_text_option(env(DB_PATH_ENV)).map(PathBuf::from))
            .or_else(|| file.db_path.clone())
            .unwrap_or_else(|| default_db_path.clone());

        let server_url = normalize_text_option(overrides.server_url.clone())
            .or_else(|| normalize_text_option(env(SERVER_URL_ENV)))
            .or_else(|| file.server_url.clone());
        let token = normalize_text_option(overrides.token.clone())
            .or_else(|| normalize_text_option(env(SYNC_TOKEN_ENV)))
            .or_else(|| file.token.clone());

        Self {
            cursor_path: cursor_path_for(&db_path, &default_db_path, data_dir),
            db_path,
            server_url,
            token,
        }
    }

    pub fn load(overrides: &Overrides) -> Result<Self, CliError> {
        let file = CliConfig::load()?;
        let data_dir = default_data_dir()?;
        Ok(Self::resolve(
            overrides,
            &file,
            |key| std::env::var(key).ok(),
            &data_dir,
        ))
    }

    /// Server URL and token, or an error when either is missing.
    pub fn sync_credentials(&self) -> Result<(String, &str), CliError> {
        match (self.server_url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) => Ok((normalize_server_url(url)?, token)),
            _ => Err(CliError::SyncNotConfigured),
        }
    }
}

/// Each database keeps its own cursor; the default store uses
/// `sync-cursor.json` in the data directory.
fn cursor_path_for(db_path: &Path, default_db_path: &Path, data_dir: &Path) -> PathBuf {
    if db_path == default_db_path {
        return data_dir.join(CURSOR_FILE_NAME);
    }
    let file_name = db_path
        .file_name()
        .map_or_else(|| DB_FILE_NAME.into(), |name| name.to_string_lossy());
    db_path.with_file_name(format!("{file_name}.{CURSOR_FILE_NAME}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn config_roundtrip_normalizes_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vocab").join(CONFIG_FILE_NAME);

        let config = CliConfig {
            version: 1,
            server_url: Some(" https://sync.example.com/ ".to_string()),
            token: Some("  ".to_string()),
            db_path: None,
        };
        config.save_to_path(&path).unwrap();

        let loaded = CliConfig::load_from_path(&path).unwrap();
        assert_eq!(
            loaded.server_url.as_deref(),
            Some("https://sync.example.com")
        );
        assert_eq!(loaded.token, None);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = CliConfig::load_from_path(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliConfig::default());
    }

    #[test]
    fn corrupt_config_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{oops").unwrap();
        assert!(matches!(
            CliConfig::load_from_path(&path),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let data_dir = PathBuf::from("/data/vocab");
        let file = CliConfig {
            server_url: Some("https://file.example.com".to_string()),
            token: Some("file-token".to_string()),
            ..CliConfig::default()
        };
        let env = HashMap::from([
            (SERVER_URL_ENV, "https://env.example.com"),
            (SYNC_TOKEN_ENV, "env-token"),
        ]);
        let lookup = |key: &str| env.get(key).map(|value| (*value).to_string());

        let resolved = EffectiveConfig::resolve(&Overrides::default(), &file, lookup, &data_dir);
        assert_eq!(
            resolved.server_url.as_deref(),
            Some("https://env.example.com")
        );
        assert_eq!(resolved.token.as_deref(), Some("env-token"));

        let overrides = Overrides {
            token: Some("flag-token".to_string()),
            ..Overrides::default()
        };
        let resolved = EffectiveConfig::resolve(&overrides, &file, lookup, &data_dir);
        assert_eq!(resolved.token.as_deref(), Some("flag-token"));

        let resolved = EffectiveConfig::resolve(&Overrides::default(), &file, no_env, &data_dir);
        assert_eq!(resolved.token.as_deref(), Some("file-token"));
    }

    #[test]
    fn default_store_uses_shared_cursor_file() {
        let data_dir = PathBuf::from("/data/vocab");
        let resolved =
            EffectiveConfig::resolve(&Overrides::default(), &CliConfig::default(), no_env, &data_dir);
        assert_eq!(resolved.db_path, data_dir.join("vocab.db"));
        assert_eq!(resolved.cursor_path, data_dir.join("sync-cursor.json"));
    }

    #[test]
    fn custom_store_gets_its_own_cursor_file() {
        let overrides = Overrides {
            db_path: Some(PathBuf::from("/tmp/other/cards.db")),
            ..Overrides::default()
        };
        let resolved = EffectiveConfig::resolve(
            &overrides,
            &CliConfig::default(),
            no_env,
            Path::new("/data/vocab"),
        );
        assert_eq!(
            resolved.cursor_path,
            PathBuf::from("/tmp/other/cards.db.sync-cursor.json")
        );
    }

    #[test]
    fn sync_credentials_require_url_and_token() {
        let mut resolved = EffectiveConfig::resolve(
            &Overrides::default(),
            &CliConfig::default(),
            no_env,
            Path::new("/data/vocab"),
        );
        assert!(matches!(
            resolved.sync_credentials(),
            Err(CliError::SyncNotConfigured)
        ));

        resolved.server_url = Some("sync.example.com".to_string());
        resolved.token = Some("token".to_string());
        assert!(matches!(
            resolved.sync_credentials(),
            Err(CliError::Config(_))
        ));

        resolved.server_url = Some("https://sync.example.com/".to_string());
        let (url, token) = resolved.sync_credentials().unwrap();
        assert_eq!(url, "https://sync.example.com");
        assert_eq!(token, "token");
    }

    #[test]
    fn debug_output_redacts_token() {
        let resolved = EffectiveConfig {
            db_path: PathBuf::from("vocab.db"),
            cursor_path: PathBuf::from("sync-cursor.json"),
            server_url: None,
            token: Some("super-secret".to_string()),
        };
        assert!(!format!("{resolved:?}").contains("super-secret"));
    }
}
