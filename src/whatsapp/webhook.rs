//! Inbound webhook decoding and subscription verification.
//!
//! The Cloud API nests everything under `entry[].changes[].value`. Only the
//! first change of the first entry is considered, which is all Meta sends for
//! a single-number business account.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("invalid webhook JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid message timestamp: {0:?}")]
    InvalidTimestamp(String),
    #[error("message {0} has no sender")]
    MissingSender(String),
}

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
struct Change {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<WireMessage>,
    #[serde(default)]
    contacts: Vec<WireContact>,
    #[serde(default)]
    statuses: Vec<DeliveryStatus>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    timestamp: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct WireContact {
    #[serde(default)]
    wa_id: String,
    #[serde(default)]
    profile: Option<WireProfile>,
}

#[derive(Debug, Deserialize)]
struct WireProfile {
    #[serde(default)]
    name: String,
}

/// Delivery-status callback (sent, delivered, read, failed)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryStatus {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
}

// ============================================================
// Decoded events
// ============================================================

/// A user message lifted out of the webhook envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    /// WhatsApp id of the sender, used as the conversation key
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Message type as reported by the provider (`text`, `image`, ...)
    pub kind: String,
    /// Text body; `None` for non-text messages
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What a POST delivery carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Message(InboundMessage),
    /// Status callbacks and account notifications; acknowledged, never answered
    NoMessage {
        field: Option<String>,
        statuses: Vec<DeliveryStatus>,
    },
}

impl WebhookEvent {
    /// Decode a raw POST body
    pub fn decode(body: &[u8]) -> Result<Self, PayloadError> {
        let payload: WebhookPayload = serde_json::from_slice(body)?;

        let Some(change) = payload
            .entry
            .into_iter()
            .next()
            .and_then(|entry| entry.changes.into_iter().next())
        else {
            return Ok(Self::NoMessage {
                field: None,
                statuses: Vec::new(),
            });
        };

        let Change { field, value } = change;
        let ChangeValue {
            messages,
            contacts,
            statuses,
        } = value;

        let Some(message) = messages.into_iter().next() else {
            return Ok(Self::NoMessage { field, statuses });
        };
        let contact = contacts.into_iter().next();

        let sender_id = contact
            .as_ref()
            .map(|c| c.wa_id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or(message.from);
        if sender_id.is_empty() {
            return Err(PayloadError::MissingSender(message.id));
        }

        let sender_name = contact
            .and_then(|c| c.profile)
            .map(|p| p.name)
            .filter(|name| !name.is_empty());

        Ok(Self::Message(InboundMessage {
            timestamp: parse_timestamp(&message.timestamp)?,
            id: message.id,
            sender_id,
            sender_name,
            kind: message.kind,
            text: message.text.map(|t| t.body),
        }))
    }
}

/// Provider timestamps are unix seconds encoded as a string
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PayloadError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| PayloadError::InvalidTimestamp(raw.to_string()))
}

// ============================================================
// Subscription verification (GET)
// ============================================================

/// Query parameters Meta sends when (re)subscribing the webhook
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ModeNotSubscribe,
    TokenMismatch,
    SecretNotConfigured,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModeNotSubscribe => "mode is not subscribe",
            Self::TokenMismatch => "token mismatch",
            Self::SecretNotConfigured => "WEBHOOK_VERIFY_TOKEN not set",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Echo the challenge back
    Verified(String),
    Rejected(RejectReason),
    MissingParameters,
}

/// Decide a subscription handshake. All three parameters are required; the
/// challenge is echoed only when the mode is `subscribe` and the token equals
/// the configured secret.
pub fn verify_subscription(query: &VerifyQuery, secret: Option<&str>) -> Verification {
    let (Some(mode), Some(token), Some(challenge)) = (
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
    ) else {
        return Verification::MissingParameters;
    };

    if mode != "subscribe" {
        return Verification::Rejected(RejectReason::ModeNotSubscribe);
    }
    let Some(secret) = secret else {
        return Verification::Rejected(RejectReason::SecretNotConfigured);
    };
    if !constant_time_eq(token, secret) {
        return Verification::Rejected(RejectReason::TokenMismatch);
    }
    Verification::Verified(challenge.to_string())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
