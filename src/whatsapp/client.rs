//! WhatsApp Cloud API client (outbound messages)

use crate::config::WhatsAppConfig;
use crate::error::{read_success_body, UpstreamError, UpstreamResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "WhatsApp";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound message body, tagged by `type` as the Graph API expects
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundMessage<'a> {
    Text {
        messaging_product: &'static str,
        to: &'a str,
        text: TextBody<'a>,
    },
    Template {
        messaging_product: &'static str,
        to: &'a str,
        template: TemplateBody<'a>,
    },
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    name: &'a str,
    language: TemplateLanguage<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateLanguage<'a> {
    code: &'a str,
}

/// What the provider returned for an accepted send
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct SentMessage {
    id: String,
}

impl SendReceipt {
    pub fn message_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }

    #[cfg(test)]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            messages: vec![SentMessage { id: id.into() }],
        }
    }
}

/// Subset of the phone-number node used by diagnostics
#[derive(Debug, Clone, Deserialize)]
pub struct PhoneNumberInfo {
    pub display_phone_number: Option<String>,
}

pub struct WhatsAppClient {
    client: Client,
    config: WhatsAppConfig,
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig) -> UpstreamResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;
        Ok(Self { client, config })
    }

    /// Access token and phone-number id, or which of them is missing
    fn credentials(&self) -> UpstreamResult<(&str, &str)> {
        match (
            self.config.access_token.as_deref(),
            self.config.phone_number_id.as_deref(),
        ) {
            (Some(token), Some(phone_id)) => Ok((token, phone_id)),
            (token, phone_id) => {
                let missing: Vec<&str> = [
                    token.is_none().then_some("token"),
                    phone_id.is_none().then_some("phone ID"),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(UpstreamError::NotConfigured {
                    service: SERVICE,
                    missing: missing.join(", "),
                })
            }
        }
    }

    fn node_url(&self, phone_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.graph_base.trim_end_matches('/'),
            self.config.api_version,
            phone_id
        )
    }

    /// Send a free-form text message. Only valid inside the interaction window.
    pub async fn send_text(&self, to: &str, body: &str) -> UpstreamResult<SendReceipt> {
        let receipt = self
            .post_message(&OutboundMessage::Text {
                messaging_product: "whatsapp",
                to,
                text: TextBody { body },
            })
            .await?;
        tracing::info!(to, message_id = ?receipt.message_id(), "WhatsApp message sent");
        Ok(receipt)
    }

    /// Send the configured pre-approved template
    pub async fn send_template(&self, to: &str) -> UpstreamResult<SendReceipt> {
        let receipt = self
            .post_message(&OutboundMessage::Template {
                messaging_product: "whatsapp",
                to,
                template: TemplateBody {
                    name: &self.config.template_name,
                    language: TemplateLanguage {
                        code: &self.config.template_language,
                    },
                },
            })
            .await?;
        tracing::info!(
            to,
            template = %self.config.template_name,
            message_id = ?receipt.message_id(),
            "WhatsApp template sent"
        );
        Ok(receipt)
    }

    async fn post_message(&self, payload: &OutboundMessage<'_>) -> UpstreamResult<SendReceipt> {
        let (token, phone_id) = self.credentials()?;

        let response = self
            .client
            .post(format!("{}/messages", self.node_url(phone_id)))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;

        let body = read_success_body(SERVICE, response).await?;
        serde_json::from_str(&body).map_err(|e| UpstreamError::decode(SERVICE, e.to_string()))
    }

    /// Look up the configured phone number; used as a connectivity check.
    pub async fn phone_number_info(&self) -> UpstreamResult<PhoneNumberInfo> {
        let (token, phone_id) = self.credentials()?;

        let response = self
            .client
            .get(self.node_url(phone_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;

        let body = read_success_body(SERVICE, response).await?;
        serde_json::from_str(&body).map_err(|e| UpstreamError::decode(SERVICE, e.to_string()))
    }

    pub fn phone_number_id(&self) -> Option<&str> {
        self.config.phone_number_id.as_deref()
    }
}
