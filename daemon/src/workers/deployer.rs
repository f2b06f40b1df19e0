//! Deployment worker
//!
//! Every accepted delivery is handled on its own task. Runs touching the same
//! directory are serialized; each run notifies admins exactly once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::deploy::archive::copy_client_archive;
use crate::deploy::context::{PipelineEnv, PipelineFailure};
use crate::deploy::locks::DeployLocks;
use crate::deploy::pipeline::run_pipeline;
use crate::deploy::report::Report;
use crate::deploy::update::pull_update;
use crate::errors::ClassifyError;
use crate::notify::Notifier;
use crate::webhook::classify::Classification;

/// Lock stage for client archives; every stage copies into the same client directory
const ARCHIVE_LOCK_STAGE: &str = "archive";
/// Lock stage for pulls of the daemon's own checkout, keyed by its path
const UPDATE_LOCK_STAGE: &str = "update";

pub struct Deployer {
    env: PipelineEnv,
    notifier: Arc<dyn Notifier>,
    locks: DeployLocks,
    tasks: Mutex<JoinSet<()>>,
}

impl Deployer {
    pub fn new(env: PipelineEnv, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            env,
            notifier,
            locks: DeployLocks::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn locks(&self) -> &DeployLocks {
        &self.locks
    }

    /// Handle a classified delivery on a background task
    pub fn dispatch(self: &Arc<Self>, classified: Result<Classification, ClassifyError>) {
        let deployer = Arc::clone(self);
        match self.tasks.lock() {
            Ok(mut tasks) => {
                while tasks.try_join_next().is_some() {}
                tasks.spawn(async move { deployer.handle(classified).await });
            }
            Err(e) => error!("Deployment task set is poisoned: {}", e),
        }
    }

    /// Handle a classified delivery to completion
    pub async fn handle(&self, classified: Result<Classification, ClassifyError>) {
        let classification = match classified {
            Ok(classification) => classification,
            Err(e) => {
                error!("{}", e);
                self.notifier.send(&e.to_string()).await;
                return;
            }
        };

        match classification {
            Classification::Ignore(reason) => debug!("Nothing to do: {}", reason),
            Classification::WorkflowReport(report) => {
                info!(
                    "Workflow on {}/{} finished: {}",
                    report.repository_name, report.branch, report.conclusion
                );
                self.notifier.send(&report.render()).await;
            }
            Classification::Update(request) => {
                let checkout = self
                    .env
                    .update_dir
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                let _guard = self.locks.acquire(&checkout, UPDATE_LOCK_STAGE).await;
                let result = pull_update(&request, &self.env).await;
                self.report(&request.repository_name, result).await;
            }
            Classification::Archive(request) => {
                let _guard = self
                    .locks
                    .acquire(&request.repository_name, ARCHIVE_LOCK_STAGE)
                    .await;
                let result = copy_client_archive(&request, &self.env).await;
                self.report(&request.build_label(), result).await;
            }
            Classification::Deploy(request) => {
                let _guard = self
                    .locks
                    .acquire(&request.repository_name, &request.stage)
                    .await;
                let result = run_pipeline(&request, &self.env).await;
                self.report(&request.container_name(), result).await;
            }
        }
    }

    async fn report(&self, target: &str, result: Result<Report, PipelineFailure>) {
        match result {
            Ok(report) => {
                info!("{} succeeded", target);
                self.notifier.send(&report.render()).await;
            }
            Err(failure) if !failure.error.is_reportable() => {
                warn!("Skipping {}: {}", target, failure.error);
            }
            Err(failure) => {
                error!("{} failed: {}", target, failure.error);
                self.notifier.send(&failure.report.render()).await;
            }
        }
    }

    /// Wait for running deployments, giving up after `timeout`
    pub async fn drain(&self, timeout: Duration) {
        let mut tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(e) => {
                error!("Deployment task set is poisoned: {}", e);
                return;
            }
        };
        if tasks.is_empty() {
            return;
        }

        info!("Waiting for {} deployment task(s)...", tasks.len());
        let joined = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("Deployment task failed: {}", e);
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!(
                "{} deployment task(s) still running after {:?}, aborting",
                tasks.len(),
                timeout
            );
            tasks.abort_all();
        }
    }
}
