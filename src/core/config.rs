//! Runtime settings read from the environment
//!
//! Every knob has an environment variable and a default. `Settings::from_env`
//! is the production path; tests feed `Settings::from_lookup` with a map.

use std::env;
use std::net::IpAddr;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::core::error::{AppError, AppResult};

/// Default webhook listen address
pub const DEFAULT_WEBHOOK_LISTEN: &str = "127.0.0.1";

/// Default webhook listen port
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Default path the webhook server accepts updates on
pub const DEFAULT_WEBHOOK_URL_PATH: &str = "/webhook";

/// Default log file
pub const DEFAULT_LOG_FILE_PATH: &str = "screenflow.log";

/// Framework settings
#[derive(Clone, Debug)]
pub struct Settings {
    /// Bot token
    /// Read from BOT_TOKEN or TELOXIDE_TOKEN
    pub token: SecretString,
    /// Receive updates through a webhook instead of long polling
    /// Read from USE_WEBHOOK
    pub use_webhook: bool,
    /// Read from WEBHOOK_LISTEN
    pub webhook_listen: IpAddr,
    /// Read from WEBHOOK_PORT
    pub webhook_port: u16,
    /// Read from WEBHOOK_URL_PATH
    pub webhook_url_path: String,
    /// Public URL Telegram posts updates to
    /// Read from WEBHOOK_URL
    pub webhook_url: Option<Url>,
    /// Ordered permission policy names (comma-separated)
    /// Read from PERMISSIONS
    pub permissions: Vec<String>,
    /// Read from ADMIN_IDS
    pub admin_ids: Vec<i64>,
    /// Read from MAINTENANCE_MODE
    pub maintenance_mode: bool,
    /// Read from LOG_FILE_PATH
    pub log_file_path: String,
    /// Read from LOG_LEVEL
    pub log_level: log::LevelFilter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: SecretString::from(String::new()),
            use_webhook: false,
            webhook_listen: IpAddr::from([127, 0, 0, 1]),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            webhook_url_path: DEFAULT_WEBHOOK_URL_PATH.to_string(),
            webhook_url: None,
            permissions: Vec::new(),
            admin_ids: Vec::new(),
            maintenance_mode: false,
            log_file_path: DEFAULT_LOG_FILE_PATH.to_string(),
            log_level: log::LevelFilter::Info,
        }
    }
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split([',', ' ', '\n', '\t'])
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// A `.env` file in the working directory is honoured if present.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let token = lookup("BOT_TOKEN")
            .or_else(|| lookup("TELOXIDE_TOKEN"))
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        let use_webhook = match lookup("USE_WEBHOOK") {
            Some(raw) => parse_bool("USE_WEBHOOK", &raw)?,
            None => defaults.use_webhook,
        };

        let webhook_listen = match lookup("WEBHOOK_LISTEN") {
            Some(raw) => raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| AppError::Config(format!("WEBHOOK_LISTEN: {e}")))?,
            None => defaults.webhook_listen,
        };

        let webhook_port = match lookup("WEBHOOK_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| AppError::Config(format!("WEBHOOK_PORT: {e}")))?,
            None => defaults.webhook_port,
        };

        let webhook_url_path = lookup("WEBHOOK_URL_PATH")
            .map(|p| if p.starts_with('/') { p } else { format!("/{p}") })
            .unwrap_or(defaults.webhook_url_path);

        let webhook_url = match lookup("WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            Some(raw) => Some(Url::parse(raw.trim())?),
            None => None,
        };

        let maintenance_mode = match lookup("MAINTENANCE_MODE") {
            Some(raw) => parse_bool("MAINTENANCE_MODE", &raw)?,
            None => defaults.maintenance_mode,
        };

        let log_level = match lookup("LOG_LEVEL") {
            Some(raw) => raw
                .trim()
                .parse::<log::LevelFilter>()
                .map_err(|_| AppError::Config(format!("LOG_LEVEL: unknown level '{}'", raw.trim())))?,
            None => defaults.log_level,
        };

        Ok(Self {
            token: SecretString::from(token),
            use_webhook,
            webhook_listen,
            webhook_port,
            webhook_url_path,
            webhook_url,
            permissions: lookup("PERMISSIONS").map(|raw| parse_list(&raw)).unwrap_or_default(),
            admin_ids: lookup("ADMIN_IDS").map(|raw| parse_admin_ids(&raw)).unwrap_or_default(),
            maintenance_mode,
            log_file_path: lookup("LOG_FILE_PATH").unwrap_or(defaults.log_file_path),
            log_level,
        })
    }

    /// Settings with only the token filled in. Handy for tests and demos.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            ..Self::default()
        }
    }

    /// Whether a non-empty token is configured.
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().is_empty()
    }

    /// Whether the given user id is listed in ADMIN_IDS.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}
