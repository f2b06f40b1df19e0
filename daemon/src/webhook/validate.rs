//! Delivery validation: event type, size, user agent and HMAC signature

use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::errors::RejectReason;
use crate::storage::settings::WebhookSettings;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_EVENT: &str = "x-github-event";
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// The request headers validation looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub event: Option<String>,
    pub content_length: Option<u64>,
    pub user_agent: Option<String>,
    pub signature: Option<String>,
}

impl WebhookHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            event: text(HEADER_EVENT),
            content_length: text(http::header::CONTENT_LENGTH.as_str())
                .and_then(|v| v.trim().parse().ok()),
            user_agent: text(http::header::USER_AGENT.as_str()),
            signature: text(HEADER_SIGNATURE),
        }
    }
}

/// Checks that need no body: event type and declared size
///
/// Runs before the body is read so oversized deliveries are never buffered.
pub fn validate_headers(headers: &WebhookHeaders, policy: &WebhookSettings) -> Result<(), RejectReason> {
    check_event(headers, policy)?;
    check_size(headers, &[], policy)
}

/// Run every check in order, stopping at the first rejection
///
/// Only the raw body is touched; nothing is parsed here.
pub fn validate_delivery(
    headers: &WebhookHeaders,
    body: &[u8],
    policy: &WebhookSettings,
    secret: &[u8],
) -> Result<(), RejectReason> {
    check_event(headers, policy)?;
    check_size(headers, body, policy)?;
    check_user_agent(headers, policy)?;
    check_signature(headers, body, secret)
}

fn check_event(headers: &WebhookHeaders, policy: &WebhookSettings) -> Result<(), RejectReason> {
    match headers.event.as_deref() {
        Some(event) if policy.allowed_events.iter().any(|e| e == event) => Ok(()),
        event => {
            warn!("Rejected event type: {:?}", event);
            Err(RejectReason::EventTypeInvalid)
        }
    }
}

fn check_size(
    headers: &WebhookHeaders,
    body: &[u8],
    policy: &WebhookSettings,
) -> Result<(), RejectReason> {
    let size = headers
        .content_length
        .unwrap_or(0)
        .max(body.len() as u64);
    if size > policy.max_payload_bytes {
        warn!("Rejected payload of {} bytes", size);
        return Err(RejectReason::PayloadTooLarge);
    }
    Ok(())
}

fn check_user_agent(headers: &WebhookHeaders, policy: &WebhookSettings) -> Result<(), RejectReason> {
    match headers.user_agent.as_deref() {
        Some(agent) if agent.starts_with(&policy.user_agent_prefix) => Ok(()),
        agent => {
            warn!("Rejected user agent: {:?}", agent);
            Err(RejectReason::AgentInvalid)
        }
    }
}

fn check_signature(headers: &WebhookHeaders, body: &[u8], secret: &[u8]) -> Result<(), RejectReason> {
    let verified = headers
        .signature
        .as_deref()
        .is_some_and(|signature| verify_signature(signature, body, secret));
    if !verified {
        warn!("Rejected delivery with a missing or wrong signature");
        return Err(RejectReason::SignatureInvalid);
    }
    Ok(())
}

fn digest(secret: &[u8], body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

/// HMAC-SHA256 of `body`, hex encoded
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Option<String> {
    digest(secret, body).map(hex::encode)
}

/// Verify a `{algorithm}={hex digest}` header value in constant time
pub fn verify_signature(header: &str, body: &[u8], secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some((_, hex_digest)) = header.split_once('=') else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest.trim()) else {
        return false;
    };
    let Some(actual) = digest(secret, body) else {
        return false;
    };
    if expected.len() != actual.len() {
        return false;
    }
    expected.ct_eq(actual.as_slice()).into()
}
