//! Trait abstractions for the relay's outbound I/O
//!
//! These traits enable testing the pipeline and the webhook handlers with
//! mock implementations.

use super::ChatRecord;
use crate::error::UpstreamResult;
use crate::google::{GoogleDocsSource, GoogleSheetsLog};
use crate::whatsapp::{SendReceipt, WhatsAppClient};
use async_trait::async_trait;

/// Delivers replies to a sender
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Free-form text; only allowed inside the interaction window
    async fn send_text(&self, to: &str, body: &str) -> UpstreamResult<SendReceipt>;

    /// The pre-approved template, for senders outside the window
    async fn send_template(&self, to: &str) -> UpstreamResult<SendReceipt>;
}

/// Source of the knowledge text
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_text(&self) -> UpstreamResult<String>;
}

/// Append-only record of answered messages
#[async_trait]
pub trait ChatLog: Send + Sync {
    async fn append(&self, record: &ChatRecord) -> UpstreamResult<()>;
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl MessageSender for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> UpstreamResult<SendReceipt> {
        WhatsAppClient::send_text(self, to, body).await
    }

    async fn send_template(&self, to: &str) -> UpstreamResult<SendReceipt> {
        WhatsAppClient::send_template(self, to).await
    }
}

#[async_trait]
impl DocumentSource for GoogleDocsSource {
    async fn fetch_text(&self) -> UpstreamResult<String> {
        self.fetch_document_text().await
    }
}

#[async_trait]
impl ChatLog for GoogleSheetsLog {
    async fn append(&self, record: &ChatRecord) -> UpstreamResult<()> {
        self.append_record(record).await
    }
}
