//! Message pipeline
//!
//! conversation store → knowledge cache → reply generator → sender.
//! Knowledge and model failures degrade to fixed text inside their
//! components; only delivery failures surface as [`RelayError`].

mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::conversation::{ConversationStore, Turn};
use crate::error::UpstreamError;
use crate::knowledge::KnowledgeCache;
use crate::responder::Responder;
use crate::whatsapp::InboundMessage;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Free-form replies are allowed this long after the user's message
pub const INTERACTION_WINDOW: TimeDelta = TimeDelta::hours(24);

/// Best-effort notice sent when the pipeline fails mid-flight
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to deliver reply: {0}")]
    Delivery(#[source] UpstreamError),
    #[error("failed to deliver template: {0}")]
    Template(#[source] UpstreamError),
}

impl RelayError {
    /// Whether the sender may still receive free-form text. A failed
    /// template means the sender is outside the interaction window.
    pub fn allows_free_form_reply(&self) -> bool {
        match self {
            Self::Delivery(_) => true,
            Self::Template(_) => false,
        }
    }
}

/// One answered exchange, as written to the chat log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub message: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A generated reply was delivered
    Replied(ChatRecord),
    /// The message was outside the interaction window
    TemplateSent,
    /// Nothing to answer (non-text message)
    Skipped,
}

/// Whether a message sent at `sent_at` may still get a free-form reply
pub fn within_window(sent_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(sent_at) <= INTERACTION_WINDOW
}

pub struct Relay {
    conversations: Arc<dyn ConversationStore>,
    knowledge: Arc<KnowledgeCache>,
    responder: Responder,
    sender: Arc<dyn MessageSender>,
}

impl Relay {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        knowledge: Arc<KnowledgeCache>,
        responder: Responder,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            conversations,
            knowledge,
            responder,
            sender,
        }
    }

    pub async fn handle(&self, message: &InboundMessage) -> Result<Outcome, RelayError> {
        self.handle_at(message, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Outcome, RelayError> {
        let sender = message.sender_id.as_str();

        let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            tracing::info!(sender, kind = %message.kind, "No text message to process");
            return Ok(Outcome::Skipped);
        };

        if !within_window(message.timestamp, now) {
            tracing::info!(
                sender,
                sent_at = %message.timestamp,
                "Message outside 24-hour window, sending template"
            );
            self.sender
                .send_template(sender)
                .await
                .map_err(RelayError::Template)?;
            return Ok(Outcome::TemplateSent);
        }

        let history = self
            .conversations
            .append(sender, Turn::user(text, message.timestamp))
            .await;
        let knowledge = self.knowledge.get().await;
        let reply = self.responder.generate(text, &knowledge, &history).await;
        self.conversations
            .append(sender, Turn::assistant(reply.as_str(), now))
            .await;

        let receipt = self
            .sender
            .send_text(sender, &reply)
            .await
            .map_err(RelayError::Delivery)?;
        tracing::info!(
            sender,
            message_id = %message.id,
            reply_id = ?receipt.message_id(),
            history_len = history.len(),
            "Message processed successfully"
        );

        Ok(Outcome::Replied(ChatRecord {
            timestamp: now,
            sender: sender.to_string(),
            message: text.to_string(),
            response: reply,
        }))
    }

    /// Tell the sender something went wrong. Failures are only logged.
    pub async fn apologize(&self, sender_id: &str) {
        if let Err(e) = self.sender.send_text(sender_id, ERROR_REPLY).await {
            tracing::warn!(sender = sender_id, error = %e, "Error sending error message");
        }
    }
}
