//! # mc-config
//!
//! Runtime settings for the Mycocheck binary.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. `MYCOCHECK__*` environment variables, e.g. `MYCOCHECK__ADMIN__EMAIL`
//!
//! `.env` is read into the process environment first.

use std::path::PathBuf;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "MYCOCHECK";
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub media_url_prefix: String,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    pub log_json: bool,
    pub admin: AdminSettings,
}

/// Account created at startup so somebody can moderate.
#[derive(Debug, Deserialize)]
pub struct AdminSettings {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

impl Settings {
    /// Loads `.env`, then [`DEFAULT_CONFIG_FILE`], then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads from an explicit config file (extension optional) and the environment.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("database_url", "sqlite:mycocheck.db")?
            .set_default("upload_dir", "./data/uploads")?
            .set_default("media_url_prefix", "/static/uploads")?
            .set_default("log_filter", "info")?
            .set_default("log_json", false)?
            .set_default("admin.name", "Admin User")?
            .set_default("admin.email", "admin@mushroom.com")?
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url is empty".into()));
        }
        if !self.admin.email.contains('@') {
            return Err(ConfigError::Invalid(format!(
                "admin.email '{}' is not an email address",
                self.admin.email
            )));
        }
        if self.admin.password.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("admin.password is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
            database_url = "sqlite::memory:"
            log_json = true

            [admin]
            password = "admin123"
            "#,
        );
        let settings = Settings::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert!(settings.log_json);
        assert_eq!(settings.media_url_prefix, "/static/uploads");
        assert_eq!(settings.admin.email, "admin@mushroom.com");
        assert_eq!(settings.admin.password.expose_secret(), "admin123");
    }

    #[test]
    fn test_missing_password_is_an_error() {
        let file = write_config("log_filter = \"debug\"\n");
        assert!(Settings::load_from(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_blank_password_is_invalid() {
        let file = write_config("[admin]\npassword = \"   \"\n");
        assert!(matches!(
            Settings::load_from(file.path().to_str().unwrap()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
