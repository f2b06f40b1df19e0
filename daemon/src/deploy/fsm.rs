//! Finite State Machine for a single deployment run

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// Created, nothing checked yet
    Pending,

    /// Working directory resolved and present
    Prepared,

    /// Images built
    Built,

    /// Schema migrations applied
    Migrated,

    /// Test suite passed
    Tested,

    /// New containers are up
    Running,

    /// Aborted by a stage error
    Failed,

    /// Cleanup finished
    Done,
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Prepare stage succeeded
    Prepared,

    /// Build stage succeeded
    Built,

    /// Migration stage succeeded
    Migrated,

    /// Test stage succeeded
    Tested,

    /// Run stage succeeded
    Started,

    /// Cleanup finished
    Finished,

    /// A stage failed
    Failed(String),
}

/// Deployment FSM
///
/// Single forward path; `Failed` and `Done` are terminal.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Pending,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, DeploymentState::Failed | DeploymentState::Done)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeploymentState::Pending, DeploymentEvent::Prepared) => DeploymentState::Prepared,
            (DeploymentState::Prepared, DeploymentEvent::Built) => DeploymentState::Built,
            (DeploymentState::Built, DeploymentEvent::Migrated) => DeploymentState::Migrated,

            // Migration is optional
            (DeploymentState::Built | DeploymentState::Migrated, DeploymentEvent::Tested) => {
                DeploymentState::Tested
            }

            (DeploymentState::Tested, DeploymentEvent::Started) => DeploymentState::Running,
            (DeploymentState::Running, DeploymentEvent::Finished) => DeploymentState::Done,

            (state, DeploymentEvent::Failed(err)) if !self.is_terminal() => {
                self.error = Some(format!("{:?}: {}", state, err));
                DeploymentState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
