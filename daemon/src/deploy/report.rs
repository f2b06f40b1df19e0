//! Structured per-run report, rendered to text for notifications

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage a report line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prepare,
    Clone,
    Pull,
    CopyEnv,
    Build,
    Migrate,
    Test,
    Run,
    Cleanup,
    Archive,
    Update,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Prepare => "Prepare",
            Stage::Clone => "Clone",
            Stage::Pull => "Pull",
            Stage::CopyEnv => "Copy .env",
            Stage::Build => "Build",
            Stage::Migrate => "Migrations",
            Stage::Test => "Tests",
            Stage::Run => "Deploy",
            Stage::Cleanup => "Cleanup",
            Stage::Archive => "Archive",
            Stage::Update => "Update",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Failed,
    /// Failed but did not abort the run
    Warning,
}

/// One line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Ordered, append-only record of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Free-form lines printed before the stage results
    pub header: Vec<String>,
    pub results: Vec<StageResult>,
    /// Terminal error, if the run aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header_line(&mut self, line: impl Into<String>) {
        self.header.push(line.into());
    }

    pub fn ok(&mut self, stage: Stage) {
        self.results.push(StageResult {
            stage,
            status: StageStatus::Ok,
            message: None,
        });
    }

    pub fn failed(&mut self, stage: Stage, message: impl Into<String>) {
        self.results.push(StageResult {
            stage,
            status: StageStatus::Failed,
            message: Some(message.into()),
        });
    }

    pub fn warning(&mut self, stage: Stage, message: impl Into<String>) {
        self.results.push(StageResult {
            stage,
            status: StageStatus::Warning,
            message: Some(message.into()),
        });
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self
                .results
                .iter()
                .all(|r| r.status != StageStatus::Failed)
    }

    /// Status of the last result recorded for `stage`
    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.results
            .iter()
            .rev()
            .find(|r| r.stage == stage)
            .map(|r| r.status)
    }

    /// Plain text sent to admins
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self.header.clone();
        if !self.header.is_empty() && !self.results.is_empty() {
            lines.push(String::new());
        }
        for result in &self.results {
            let line = match (&result.status, &result.message) {
                (StageStatus::Ok, _) => format!("{}: OK", result.stage),
                (StageStatus::Failed, Some(msg)) => format!("{}: FAILED ({})", result.stage, msg),
                (StageStatus::Failed, None) => format!("{}: FAILED", result.stage),
                (StageStatus::Warning, Some(msg)) => format!("{}: WARNING ({})", result.stage, msg),
                (StageStatus::Warning, None) => format!("{}: WARNING", result.stage),
            };
            lines.push(line);
        }
        if let Some(error) = &self.error {
            lines.push(String::new());
            lines.push(format!("Error: {}", error));
        }
        f.write_str(&lines.join("\n"))
    }
}
