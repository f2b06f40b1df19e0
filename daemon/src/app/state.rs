//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::deploy::context::PipelineEnv;
use crate::deploy::runner::CommandRunner;
use crate::notify::Notifier;
use crate::server::state::ServerState;
use crate::storage::settings::Settings;
use crate::workers::deployer::Deployer;

/// Main application state
pub struct AppState {
    /// Immutable settings
    pub settings: Arc<Settings>,

    /// Admin notifier
    pub notifier: Arc<dyn Notifier>,

    /// Background deployment runner
    pub deployer: Arc<Deployer>,
}

impl AppState {
    /// Initialize application state
    pub fn init(
        settings: Arc<Settings>,
        notifier: Arc<dyn Notifier>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        info!("Initializing application state...");

        let env = PipelineEnv::from_settings(&settings, runner);
        let deployer = Arc::new(Deployer::new(env, notifier.clone()));

        Self {
            settings,
            notifier,
            deployer,
        }
    }

    /// State handed to the HTTP handlers
    pub fn server_state(&self) -> ServerState {
        ServerState::new(self.settings.clone(), self.deployer.clone())
    }
}
