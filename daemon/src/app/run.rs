//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::deploy::runner::CommandRunner;
use crate::errors::DaemonError;
use crate::notify::{startup_message, Notifier};
use crate::server::serve::{build_router, serve};
use crate::storage::settings::Settings;
use crate::utils::version_info;
use crate::workers::deployer::Deployer;

/// Run the daemon until `shutdown_signal` resolves
pub async fn run(
    settings: Arc<Settings>,
    options: AppOptions,
    notifier: Arc<dyn Notifier>,
    runner: Arc<dyn CommandRunner>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DaemonError> {
    info!("Initializing deployhook...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = AppState::init(settings, notifier, runner);
    shutdown_manager.with_deployer(app_state.deployer.clone())?;

    if let Err(e) = init_server(&app_state, &mut shutdown_manager, shutdown_tx.subscribe()).await {
        error!("Failed to start deployhook: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    if options.notify_startup {
        let message = startup_message(&options.app_name, &version_info(), &options.location);
        app_state.notifier.send(&message).await;
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init_server(
    app_state: &AppState,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    info!("Initializing HTTP server...");

    let router = build_router(Arc::new(app_state.server_state()));
    let server_handle = serve(&app_state.settings.server, router, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    server_handle: Option<JoinHandle<Result<(), DaemonError>>>,
    deployer: Option<Arc<Deployer>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            server_handle: None,
            deployer: None,
        }
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), DaemonError>>,
    ) -> Result<(), DaemonError> {
        if self.server_handle.is_some() {
            return Err(DaemonError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub fn with_deployer(&mut self, deployer: Arc<Deployer>) -> Result<(), DaemonError> {
        if self.deployer.is_some() {
            return Err(DaemonError::ShutdownError("deployer already set".to_string()));
        }
        self.deployer = Some(deployer);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), DaemonError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DaemonError> {
        info!("Shutting down deployhook...");

        // 1. Stop accepting deliveries
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| DaemonError::ShutdownError(e.to_string()))??;
        }

        // 2. Let running deployments finish
        if let Some(deployer) = self.deployer.take() {
            deployer.drain(self.lifecycle_options.drain_timeout).await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
