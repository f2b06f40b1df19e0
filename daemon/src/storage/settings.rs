//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::errors::DaemonError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Environment variable overriding `github_secret`
pub const ENV_GITHUB_SECRET: &str = "GITHUB_SECRET";
/// Environment variable overriding `telebot_token`
pub const ENV_TELEBOT_TOKEN: &str = "TELEBOT_TOKEN";
/// Environment variable overriding `log_level`
pub const ENV_LOG_LEVEL: &str = "DEPLOYHOOK_LOG_LEVEL";

/// Daemon settings
///
/// Loaded once at startup, validated eagerly and shared read-only afterwards.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for the rolling log file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Telegram chat ids notified about every run
    #[serde(default)]
    pub admins: Vec<String>,

    /// Telegram bot token
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub telebot_token: Option<SecretString>,

    /// Telegram bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,

    /// Human readable host name shown in the startup message
    #[serde(default = "default_location")]
    pub location: String,

    /// Branch name to stage name
    #[serde(default)]
    pub stages: BTreeMap<String, String>,

    /// Repositories that may be deployed as containers
    #[serde(default)]
    pub applications: Vec<String>,

    /// Repositories handled by the archive-copy path
    #[serde(default)]
    pub clients: Vec<String>,

    /// Repository name suffix routing to the archive-copy path
    #[serde(default = "default_client_suffix")]
    pub client_suffix: String,

    /// Repositories that only get pulled into `update_dir`
    #[serde(default)]
    pub update: Vec<String>,

    /// Checkout pulled for repositories in `update`
    #[serde(default)]
    pub update_dir: Option<PathBuf>,

    /// Shared webhook secret
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub github_secret: Option<SecretString>,

    /// Webhook validation settings
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Deployment settings
    #[serde(default)]
    pub deploy: DeploySettings,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(SecretString::from))
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_location() -> String {
    "unknown".to_string()
}

fn default_client_suffix() -> String {
    "_client".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            server: ServerSettings::default(),
            admins: Vec::new(),
            telebot_token: None,
            telegram_api_base: default_telegram_api_base(),
            location: default_location(),
            stages: BTreeMap::new(),
            applications: Vec::new(),
            clients: Vec::new(),
            client_suffix: default_client_suffix(),
            update: Vec::new(),
            update_dir: None,
            github_secret: None,
            webhook: WebhookSettings::default(),
            deploy: DeploySettings::default(),
        }
    }
}

impl Settings {
    /// Read, override from the environment and validate
    pub async fn load(file: &File) -> Result<Self, DaemonError> {
        debug!("Loading settings from {}", file.path().display());
        let mut settings: Settings = file.read_json().await.map_err(|e| {
            DaemonError::ConfigError(format!("{}: {}", file.path().display(), e))
        })?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Override secrets and the log level from environment lookups
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_GITHUB_SECRET).filter(|s| !s.is_empty()) {
            self.github_secret = Some(SecretString::from(secret));
        }
        if let Some(token) = lookup(ENV_TELEBOT_TOKEN).filter(|s| !s.is_empty()) {
            self.telebot_token = Some(SecretString::from(token));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(|l| l.parse().ok()) {
            self.log_level = level;
        }
    }

    /// Presence checks for everything the daemon cannot run without
    pub fn validate(&self) -> Result<(), DaemonError> {
        let missing = |what: &str| Err(DaemonError::ConfigError(format!("{} is not set", what)));

        if self.github_secret_bytes().is_empty() {
            return missing("github_secret");
        }
        if self
            .telebot_token
            .as_ref()
            .map_or(true, |t| t.expose_secret().is_empty())
        {
            return missing("telebot_token");
        }
        if self.admins.is_empty() {
            return missing("admins");
        }
        if self.stages.is_empty() {
            return missing("stages");
        }
        if self.deploy.build_attempts == 0 {
            return Err(DaemonError::ConfigError(
                "deploy.build_attempts must be at least 1".to_string(),
            ));
        }
        if self.deploy.command_timeout_secs == 0 {
            return Err(DaemonError::ConfigError(
                "deploy.command_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.deploy.migrate_command.is_empty() || self.deploy.test_command.is_empty() {
            return Err(DaemonError::ConfigError(
                "deploy.migrate_command and deploy.test_command must not be empty".to_string(),
            ));
        }
        if !self.update.is_empty() && self.update_dir.is_none() {
            return missing("update_dir");
        }
        Ok(())
    }

    /// Stage for a branch, `None` when the branch must not deploy
    pub fn stage_for(&self, branch: &str) -> Option<&str> {
        self.stages.get(branch).map(String::as_str)
    }

    pub fn is_update_target(&self, repository: &str) -> bool {
        self.update.iter().any(|u| u == repository)
    }

    /// Raw webhook secret bytes, empty when unset
    pub fn github_secret_bytes(&self) -> &[u8] {
        self.github_secret
            .as_ref()
            .map(|s| s.expose_secret().as_bytes())
            .unwrap_or_default()
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Extra path the webhook receiver is mounted on besides `/`
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_webhook_path() -> String {
    "/deploy".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// Webhook validation settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    #[serde(default = "default_allowed_events")]
    pub allowed_events: Vec<String>,

    #[serde(default = "default_user_agent_prefix")]
    pub user_agent_prefix: String,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
}

fn default_allowed_events() -> Vec<String> {
    vec![
        "push".to_string(),
        "workflow_run".to_string(),
        "workflow_job".to_string(),
    ]
}

fn default_user_agent_prefix() -> String {
    "GitHub-Hookshot/".to_string()
}

fn default_max_payload_bytes() -> u64 {
    1_000_000
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            allowed_events: default_allowed_events(),
            user_agent_prefix: default_user_agent_prefix(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Deployment pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySettings {
    /// Root of `{repo}/{stage}` working directories
    #[serde(default = "default_deploy_root")]
    pub deploy_root: PathBuf,

    /// Root of per-client archive directories
    #[serde(default = "default_clients_dir")]
    pub clients_dir: PathBuf,

    /// Upper bound for any single external command
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Attempts made for the build stage
    #[serde(default = "default_build_attempts")]
    pub build_attempts: u32,

    /// Command run inside the `app` service to migrate the schema
    #[serde(default = "default_migrate_command")]
    pub migrate_command: Vec<String>,

    /// Command run inside the `app` service to test the build
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,
}

fn default_deploy_root() -> PathBuf {
    PathBuf::from("/srv/deploy")
}

fn default_clients_dir() -> PathBuf {
    PathBuf::from("/srv/deploy/clients")
}

fn default_command_timeout_secs() -> u64 {
    30 * 60
}

fn default_build_attempts() -> u32 {
    2
}

fn default_migrate_command() -> Vec<String> {
    ["alembic", "upgrade", "head"].map(String::from).to_vec()
}

fn default_test_command() -> Vec<String> {
    ["pytest", "-k", "server", "tests/"].map(String::from).to_vec()
}

impl DeploySettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            deploy_root: default_deploy_root(),
            clients_dir: default_clients_dir(),
            command_timeout_secs: default_command_timeout_secs(),
            build_attempts: default_build_attempts(),
            migrate_command: default_migrate_command(),
            test_command: default_test_command(),
        }
    }
}
