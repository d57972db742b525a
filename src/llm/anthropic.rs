//! Anthropic Messages API client

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model used when `ANTHROPIC_MODEL` is not set
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicService {
    pub fn new(api_key: String, model: String, gateway: Option<&str>) -> Result<Self, LlmError> {
        let base_url = match gateway {
            Some(gw) => format!("{}/_/gateway/anthropic/v1/messages", gw.trim_end_matches('/')),
            None => "https://api.anthropic.com/v1/messages".to_string(),
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let system = request
            .system
            .iter()
            .map(|s| AnthropicSystemBlock {
                r#type: "text",
                text: s.text.clone(),
                cache_control: s.cache.then_some(CacheControl { r#type: "ephemeral" }),
            })
            .collect();

        let messages = request.messages.iter().map(translate_message).collect();

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
        }
    }
}

fn translate_message(msg: &LlmMessage) -> AnthropicMessage {
    let role = match msg.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };
    AnthropicMessage {
        role,
        content: msg.text.clone(),
    }
}

fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
    let content = resp
        .content
        .into_iter()
        .map(|block| match (block.kind.as_str(), block.text) {
            ("text", Some(text)) => ContentBlock::Text { text },
            _ => ContentBlock::Other { kind: block.kind },
        })
        .collect();

    LlmResponse {
        content,
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            cache_creation_tokens: resp.usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: resp.usage.cache_read_input_tokens.unwrap_or(0),
        },
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::auth(format!("Authentication failed: {body}")),
        429 => LlmError::rate_limit(format!("Rate limited: {body}")),
        400 => LlmError::invalid_request(format!("Invalid request: {body}")),
        500..=599 => LlmError::server_error(format!("Server error: {body}")),
        _ => LlmError::unknown(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let anthropic_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::malformed(format!("Failed to parse response: {e}")))?;

        Ok(normalize_response(anthropic_response))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, SystemContent};
    use serde_json::json;

    fn service() -> AnthropicService {
        AnthropicService::new("test-key".to_string(), DEFAULT_MODEL.to_string(), None).unwrap()
    }

    #[test]
    fn gateway_rewrites_base_url() {
        let svc = AnthropicService::new(
            "implicit".to_string(),
            DEFAULT_MODEL.to_string(),
            Some("https://gw.example.com/"),
        )
        .unwrap();
        assert_eq!(
            svc.base_url,
            "https://gw.example.com/_/gateway/anthropic/v1/messages"
        );
    }

    #[test]
    fn request_wire_shape() {
        let request = LlmRequest {
            system: vec![
                SystemContent::cached("instructions"),
                SystemContent::new("question"),
            ],
            messages: vec![LlmMessage::user("hi"), LlmMessage::assistant("hello")],
            max_tokens: Some(1000),
        };

        let wire = serde_json::to_value(service().translate_request(&request)).unwrap();
        assert_eq!(
            wire,
            json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 1000,
                "system": [
                    {"type": "text", "text": "instructions", "cache_control": {"type": "ephemeral"}},
                    {"type": "text", "text": "question"}
                ],
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ]
            })
        );
    }

    #[test]
    fn empty_system_is_omitted() {
        let request = LlmRequest {
            system: vec![],
            messages: vec![LlmMessage::user("Test")],
            max_tokens: None,
        };
        let wire = serde_json::to_value(service().translate_request(&request)).unwrap();
        assert!(wire.get("system").is_none());
        assert_eq!(wire["max_tokens"], 1024);
    }

    #[test]
    fn response_keeps_text_and_marks_other_blocks() {
        let resp: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Hello there"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 3, "cache_read_input_tokens": 7}
        }))
        .unwrap();

        let normalized = normalize_response(resp);
        assert_eq!(normalized.first_text(), Some("Hello there"));
        assert_eq!(
            normalized.content[1],
            ContentBlock::Other {
                kind: "tool_use".to_string()
            }
        );
        assert_eq!(normalized.usage.cache_read_tokens, 7);
        assert_eq!(normalized.usage.cache_creation_tokens, 0);
    }

    #[test]
    fn error_classification() {
        use reqwest::StatusCode;
        assert_eq!(
            classify_error(StatusCode::UNAUTHORIZED, "").kind,
            LlmErrorKind::Auth
        );
        assert_eq!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, "").kind,
            LlmErrorKind::RateLimit
        );
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, "").kind,
            LlmErrorKind::InvalidRequest
        );
        assert_eq!(
            classify_error(StatusCode::from_u16(529).unwrap(), "overloaded").kind,
            LlmErrorKind::ServerError
        );
        assert_eq!(
            classify_error(StatusCode::IM_A_TEAPOT, "").kind,
            LlmErrorKind::Unknown
        );
    }
}
