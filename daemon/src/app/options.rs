//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Name used in the startup notification
    pub app_name: String,

    /// Host shown in the startup notification
    pub location: String,

    /// Send the startup notification
    pub notify_startup: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            app_name: env!("CARGO_PKG_NAME").to_string(),
            location: "unknown".to_string(),
            notify_startup: true,
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            location: settings.location.clone(),
            ..Default::default()
        }
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Time running deployments get to finish once shutdown starts
    pub drain_timeout: Duration,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(20),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
