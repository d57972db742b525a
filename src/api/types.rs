//! API response types

use super::status::ServiceStatus;
use serde::{Deserialize, Serialize};

/// Acknowledgement for a processed webhook delivery
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

impl WebhookAck {
    pub fn success() -> Self {
        Self { status: "success" }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Query for `/api/status`; `api` narrows the check to one service
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub api: Option<String>,
}

/// Per-service results of `/api/status`; unselected services are omitted
#[derive(Debug, Serialize)]
pub struct ServicesStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<ServiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<ServiceStatus>,
}

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub timestamp: String,
    pub services: ServicesStatus,
    pub build_info: BuildInfo,
}
