//! Connectivity probes behind `/api/status`
//!
//! Each probe reports `connected`, `not_configured` or `error` with a short
//! human-readable message. Probes never fail; upstream errors become `error`.

use super::types::ServicesStatus;
use crate::error::UpstreamError;
use crate::google::{GoogleAuth, SCOPE_DOCS_READONLY};
use crate::llm::{LlmMessage, LlmRequest, LlmService};
use crate::whatsapp::WhatsAppClient;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Connected,
    NotConfigured,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub status: ProbeState,
    pub message: String,
}

impl ServiceStatus {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            status: ProbeState::Connected,
            message: message.into(),
        }
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self {
            status: ProbeState::NotConfigured,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProbeState::Error,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ServiceStatus;
}

/// Which services a status request asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    All,
    WhatsApp,
    Anthropic,
    Google,
}

impl ProbeTarget {
    /// Unknown or missing names select every service
    pub fn parse(api: Option<&str>) -> Self {
        match api {
            Some("whatsapp") => Self::WhatsApp,
            Some("anthropic" | "openai") => Self::Anthropic,
            Some("google" | "googleSheets" | "googleDocs" | "googleCalendar") => Self::Google,
            _ => Self::All,
        }
    }

    fn includes(self, service: Self) -> bool {
        self == Self::All || self == service
    }
}

/// The three probes `/api/status` runs
#[derive(Clone)]
pub struct Probes {
    pub whatsapp: Arc<dyn HealthProbe>,
    pub anthropic: Arc<dyn HealthProbe>,
    pub google: Arc<dyn HealthProbe>,
}

impl Probes {
    /// Run the selected probes concurrently
    pub async fn run(&self, target: ProbeTarget) -> ServicesStatus {
        let (whatsapp, anthropic, google) = futures::join!(
            check_if(target, ProbeTarget::WhatsApp, self.whatsapp.as_ref()),
            check_if(target, ProbeTarget::Anthropic, self.anthropic.as_ref()),
            check_if(target, ProbeTarget::Google, self.google.as_ref())
        );
        ServicesStatus {
            whatsapp,
            anthropic,
            google,
        }
    }
}

async fn check_if(
    target: ProbeTarget,
    service: ProbeTarget,
    probe: &dyn HealthProbe,
) -> Option<ServiceStatus> {
    if target.includes(service) {
        Some(probe.check().await)
    } else {
        None
    }
}

#[async_trait]
impl HealthProbe for WhatsAppClient {
    async fn check(&self) -> ServiceStatus {
        match self.phone_number_info().await {
            Ok(info) => {
                let number = info
                    .display_phone_number
                    .as_deref()
                    .or(self.phone_number_id())
                    .unwrap_or_default();
                ServiceStatus::connected(format!("Connected: {number}"))
            }
            Err(UpstreamError::NotConfigured { missing, .. }) => {
                ServiceStatus::not_configured(format!("Missing credentials: {missing}"))
            }
            Err(UpstreamError::Status { status, .. }) => ServiceStatus::error(format!(
                "HTTP {status}: Invalid credentials or permissions"
            )),
            Err(e) => ServiceStatus::error(format!("Connection failed: {e}")),
        }
    }
}

/// Sends a tiny completion through the configured model
pub struct AnthropicProbe {
    llm: Option<Arc<dyn LlmService>>,
}

impl AnthropicProbe {
    pub fn new(llm: Option<Arc<dyn LlmService>>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl HealthProbe for AnthropicProbe {
    async fn check(&self) -> ServiceStatus {
        let Some(llm) = &self.llm else {
            return ServiceStatus::not_configured("Missing ANTHROPIC_API_KEY environment variable");
        };

        let request = LlmRequest {
            system: Vec::new(),
            messages: vec![LlmMessage::user("Test")],
            max_tokens: Some(10),
        };
        match llm.complete(&request).await {
            Ok(response) if !response.content.is_empty() => {
                ServiceStatus::connected("Claude AI API connected successfully")
            }
            Ok(_) => ServiceStatus::error("Invalid API response"),
            Err(e) => ServiceStatus::error(format!("API error: {}", e.message)),
        }
    }
}

#[async_trait]
impl HealthProbe for GoogleAuth {
    async fn check(&self) -> ServiceStatus {
        match self.access_token(SCOPE_DOCS_READONLY).await {
            Ok(_) => ServiceStatus::connected(format!(
                "Google APIs authenticated ({})",
                self.client_email().unwrap_or_default()
            )),
            Err(UpstreamError::NotConfigured { missing, .. }) => {
                ServiceStatus::not_configured(format!("Missing Google credentials: {missing}"))
            }
            Err(e) => ServiceStatus::error(format!("Authentication failed: {e}")),
        }
    }
}
