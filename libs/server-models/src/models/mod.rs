//! Deployhook HTTP response models

use serde::{Deserialize, Serialize};

/// Static acknowledgement returned by `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub root: String,
}

impl Default for RootResponse {
    fn default() -> Self {
        Self {
            root: "OKidoki".to_string(),
        }
    }
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
    /// RFC 3339 time the daemon started
    pub started_at: String,
}

/// Webhook receiver response, `{"result": "ok"}` or a rejection reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub result: String,
}

impl WebhookResponse {
    pub fn ok() -> Self {
        Self {
            result: "ok".to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            result: reason.into(),
        }
    }
}
