//! Server state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::storage::settings::Settings;
use crate::workers::deployer::Deployer;

/// Server state shared across handlers
pub struct ServerState {
    pub settings: Arc<Settings>,
    pub deployer: Arc<Deployer>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(settings: Arc<Settings>, deployer: Arc<Deployer>) -> Self {
        Self {
            settings,
            deployer,
            started_at: Utc::now(),
        }
    }
}
