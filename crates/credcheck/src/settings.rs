//! Credentials settings file.
//!
//! The file is JSON with PascalCase keys:
//!
//! ```json
//! {
//!   "Username": "user@example.com",
//!   "Password": "app-password",
//!   "HostIp": "smtp.example.com",
//!   "Port": 587,
//!   "EnableSSL": false
//! }
//! ```
//!
//! Missing keys take their defaults and unknown keys are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "email.credentials.settings";

/// Errors from reading or writing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read or written.
    #[error("settings file {path}: {source}")]
    Io {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid settings JSON.
    #[error("settings file {path} is malformed: {source}")]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// Server and login used by the checker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Settings {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Server host name or address.
    pub host_ip: String,
    /// Server port.
    pub port: u16,
    /// Connect with implicit TLS.
    #[serde(rename = "EnableSSL")]
    pub enable_ssl: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            host_ip: "127.0.0.1".to_string(),
            port: 587,
            enable_ssl: false,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host_ip", &self.host_ip)
            .field("port", &self.port)
            .field("enable_ssl", &self.enable_ssl)
            .finish()
    }
}

impl Settings {
    /// Loads settings from `path`, writing a default file first if it is
    /// missing or blank.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or if it
    /// holds something other than settings JSON.
    pub async fn load_or_create(path: &Path) -> Result<Self, SettingsError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if contents.trim().is_empty() {
            let settings = Self::default();
            settings.save(path).await?;
            info!(path = %path.display(), "wrote default settings");
            return Ok(settings);
        }

        serde_json::from_str(&contents).map_err(|source| SettingsError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the settings to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let contents =
            serde_json::to_string_pretty(self).map_err(|source| SettingsError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);

        let settings = Settings::load_or_create(&path).await.unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.host_ip, "127.0.0.1");
        assert_eq!(settings.port, 587);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"HostIp\": \"127.0.0.1\""));
        assert!(written.contains("\"EnableSSL\": false"));
    }

    #[tokio::test]
    async fn test_blank_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, "  \n").unwrap();

        let settings = Settings::load_or_create(&path).await.unwrap();

        assert_eq!(settings, Settings::default());
        assert!(std::fs::read_to_string(&path).unwrap().contains("Username"));
    }

    #[tokio::test]
    async fn test_reads_pascal_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{
                "Username": "user@example.com",
                "Password": "secret",
                "HostIp": "smtp.example.com",
                "Port": 465,
                "EnableSSL": true,
                "SenderName": "ignored"
            }"#,
        )
        .unwrap();

        let settings = Settings::load_or_create(&path).await.unwrap();

        assert_eq!(settings.username, "user@example.com");
        assert_eq!(settings.password, "secret");
        assert_eq!(settings.host_ip, "smtp.example.com");
        assert_eq!(settings.port, 465);
        assert!(settings.enable_ssl);
    }

    #[tokio::test]
    async fn test_partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, r#"{"Username": "user"}"#).unwrap();

        let settings = Settings::load_or_create(&path).await.unwrap();

        assert_eq!(settings.username, "user");
        assert_eq!(settings.port, 587);
        assert!(!settings.enable_ssl);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let err = Settings::load_or_create(&path).await.unwrap_err();

        assert!(matches!(err, SettingsError::Malformed { .. }));
        // The broken file is left for the user to fix
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = Settings {
            password: "hunter2".to_string(),
            ..Settings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
