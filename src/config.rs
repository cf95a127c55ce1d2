//! Run configuration: an optional TOML file overlaid by environment variables.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Environment variables always take precedence over the file. Credentials
//! have no defaults, and the SMTP password is only ever read from the
//! environment.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::mail::{Envelope, SmtpSettings, SMTP_TIMEOUT};

pub const ENV_SMTP_SERVER: &str = "SMTP_SERVER";
pub const ENV_SMTP_PORT: &str = "SMTP_PORT";
pub const ENV_SMTP_USER: &str = "SMTP_USER";
pub const ENV_SMTP_PWD: &str = "SMTP_PWD";
pub const ENV_FROM_EMAIL: &str = "FROM_EMAIL";
pub const ENV_TO_EMAIL: &str = "TO_EMAIL";
pub const ENV_AWS_BUCKET: &str = "AWS_BUCKET";
pub const ENV_FEEDLIST_FILE: &str = "FEEDLIST_FILE";
pub const ENV_FEED_TIMEOUT_SECS: &str = "FEED_TIMEOUT_SECS";

/// Subject line of every digest email.
pub const DEFAULT_SUBJECT: &str = "Today's new articles and videos.";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A setting required for this run is not set anywhere.
    #[error("Missing required setting: {0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Settings for one digest run.
///
/// All file keys use `#[serde(default)]` so any subset can be specified.
/// Required values are checked where they are used ([`Config::smtp`],
/// [`Config::envelope`], [`Config::feed_list_location`]) so that e.g. a dry
/// run does not need SMTP credentials.
///
/// SEC-015: Custom Debug impl masks `smtp_password`.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// SMTP relay host name.
    pub smtp_server: Option<String>,

    /// SMTP submission port (STARTTLS).
    pub smtp_port: u16,

    /// SMTP login.
    pub smtp_user: Option<String>,

    /// SMTP password. Environment only (`SMTP_PWD`).
    #[serde(skip)]
    pub smtp_password: Option<SecretString>,

    /// Sender address of the digest.
    pub from_email: Option<String>,

    /// Recipient address of the digest.
    pub to_email: Option<String>,

    /// S3 bucket holding the feed list.
    pub aws_bucket: Option<String>,

    /// Object key of the feed list inside `aws_bucket`.
    pub feedlist_file: Option<String>,

    /// Per-feed fetch timeout in seconds.
    pub fetch_timeout_secs: u64,

    /// Email subject line.
    pub subject: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp_server: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            from_email: None,
            to_email: None,
            aws_bucket: None,
            feedlist_file: None,
            fetch_timeout_secs: 30,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

/// SEC-015: Mask smtp_password in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field(
                "smtp_password",
                &self.smtp_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("from_email", &self.from_email)
            .field("to_email", &self.to_email)
            .field("aws_bucket", &self.aws_bucket)
            .field("feedlist_file", &self.feedlist_file)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("subject", &self.subject)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "smtp_server",
        "smtp_port",
        "smtp_user",
        "from_email",
        "to_email",
        "aws_bucket",
        "feedlist_file",
        "fetch_timeout_secs",
        "subject",
    ];

    /// Loads the optional config file, then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// Like [`Config::load`] with an injectable environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        tracing::debug!(config = ?config, "Resolved configuration");
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if key == "smtp_password" || key == "smtp_pwd" {
                    tracing::warn!(
                        key = %key,
                        "SMTP password in config file is ignored, set {} instead",
                        ENV_SMTP_PWD
                    );
                } else if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Overlays environment variables. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_SMTP_SERVER) {
            self.smtp_server = Some(v);
        }
        if let Some(v) = get(ENV_SMTP_PORT) {
            self.smtp_port = v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: ENV_SMTP_PORT,
                value: v.clone(),
            })?;
        }
        if let Some(v) = get(ENV_SMTP_USER) {
            self.smtp_user = Some(v);
        }
        if let Some(v) = get(ENV_SMTP_PWD) {
            self.smtp_password = Some(SecretString::from(v));
        }
        if let Some(v) = get(ENV_FROM_EMAIL) {
            self.from_email = Some(v);
        }
        if let Some(v) = get(ENV_TO_EMAIL) {
            self.to_email = Some(v);
        }
        if let Some(v) = get(ENV_AWS_BUCKET) {
            self.aws_bucket = Some(v);
        }
        if let Some(v) = get(ENV_FEEDLIST_FILE) {
            self.feedlist_file = Some(v);
        }
        if let Some(v) = get(ENV_FEED_TIMEOUT_SECS) {
            self.fetch_timeout_secs = v.trim().parse().map_err(|_| ConfigError::Invalid {
                var: ENV_FEED_TIMEOUT_SECS,
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// SMTP transport settings. Server, user and password are required.
    pub fn smtp(&self) -> Result<SmtpSettings, ConfigError> {
        let server = self
            .smtp_server
            .clone()
            .ok_or(ConfigError::Missing(ENV_SMTP_SERVER))?;
        let user = self
            .smtp_user
            .clone()
            .ok_or(ConfigError::Missing(ENV_SMTP_USER))?;
        let password = self
            .smtp_password
            .as_ref()
            .map(|p| SecretString::from(secrecy::ExposeSecret::expose_secret(p).to_owned()))
            .ok_or(ConfigError::Missing(ENV_SMTP_PWD))?;

        Ok(SmtpSettings {
            server,
            port: self.smtp_port,
            user,
            password,
            timeout: SMTP_TIMEOUT,
        })
    }

    /// Sender, recipient and subject of the digest.
    pub fn envelope(&self) -> Result<Envelope, ConfigError> {
        let from = self
            .from_email
            .clone()
            .ok_or(ConfigError::Missing(ENV_FROM_EMAIL))?;
        let to = self
            .to_email
            .clone()
            .ok_or(ConfigError::Missing(ENV_TO_EMAIL))?;
        Ok(Envelope {
            from,
            to,
            subject: self.subject.clone(),
        })
    }

    /// `(bucket, key)` of the feed list object.
    pub fn feed_list_location(&self) -> Result<(String, String), ConfigError> {
        let bucket = self
            .aws_bucket
            .clone()
            .ok_or(ConfigError::Missing(ENV_AWS_BUCKET))?;
        let key = self
            .feedlist_file
            .clone()
            .ok_or(ConfigError::Missing(ENV_FEEDLIST_FILE))?;
        Ok((bucket, key))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================
