//! Admin notifications

pub mod telegram;

use async_trait::async_trait;

use crate::utils::VersionInfo;

/// Delivers plain-text messages to every admin
///
/// Delivery failures are logged by the implementation and never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Message sent once the daemon is listening
pub fn startup_message(app: &str, version: &VersionInfo, location: &str) -> String {
    format!(
        "{} started.\nBuild:[{}]\nVersion:[{}]\nLocation: [{}]",
        app, version.git_hash, version.version, location
    )
}
