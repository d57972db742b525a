//! Mock implementations for testing
//!
//! These mocks enable pipeline and handler tests without real I/O.

use super::traits::*;
use super::ChatRecord;
use crate::error::{UpstreamError, UpstreamResult};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::whatsapp::SendReceipt;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock LLM
// ============================================================================

/// Mock model that returns queued responses
#[derive(Default)]
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Mock Document Source
// ============================================================================

/// Returns queued fetch results; an empty queue is an outage
#[derive(Default)]
pub struct MockDocumentSource {
    results: Mutex<VecDeque<UpstreamResult<String>>>,
    fetches: AtomicUsize,
}

impl MockDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_text(&self, text: &str) {
        self.results.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn queue_error(&self, error: UpstreamError) {
        self.results.lock().unwrap().push_back(Err(error));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MockDocumentSource {
    async fn fetch_text(&self) -> UpstreamResult<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(UpstreamError::Transport {
                service: "Google",
                message: "No mock document queued".to_string(),
            })
        })
    }
}

// ============================================================================
// Mock Sender
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { to: String, body: String },
    Template { to: String },
}

/// Records every send; fails with a fixed status once told to
#[derive(Default)]
pub struct MockSender {
    sent: Mutex<Vec<Sent>>,
    fail_status: Mutex<Option<u16>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send fail with this HTTP status
    pub fn fail_with_status(&self, status: u16) {
        *self.fail_status.lock().unwrap() = Some(status);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, sent: Sent) -> UpstreamResult<SendReceipt> {
        self.sent.lock().unwrap().push(sent);
        match *self.fail_status.lock().unwrap() {
            Some(status) => Err(UpstreamError::Status {
                service: "WhatsApp",
                status,
                body: "{\"error\":{\"message\":\"mock failure\"}}".to_string(),
            }),
            None => Ok(SendReceipt::with_id("wamid.mock")),
        }
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send_text(&self, to: &str, body: &str) -> UpstreamResult<SendReceipt> {
        self.record(Sent::Text {
            to: to.to_string(),
            body: body.to_string(),
        })
    }

    async fn send_template(&self, to: &str) -> UpstreamResult<SendReceipt> {
        self.record(Sent::Template { to: to.to_string() })
    }
}

// ============================================================================
// Mock Chat Log
// ============================================================================

/// Collects appended records. Appends run on spawned tasks, so tests wait
/// for them with [`MockChatLog::wait_for`].
#[derive(Default)]
pub struct MockChatLog {
    records: Mutex<Vec<ChatRecord>>,
    appended: Notify,
    fail: bool,
}

impl MockChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log whose appends are attempted but always fail
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<ChatRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Wait until at least `count` appends were attempted
    pub async fn wait_for(&self, count: usize) -> Vec<ChatRecord> {
        let deadline = Duration::from_secs(5);
        while self.records.lock().unwrap().len() < count {
            tokio::time::timeout(deadline, self.appended.notified())
                .await
                .expect("timed out waiting for chat log append");
        }
        self.records()
    }
}

#[async_trait]
impl ChatLog for MockChatLog {
    async fn append(&self, record: &ChatRecord) -> UpstreamResult<()> {
        self.records.lock().unwrap().push(record.clone());
        self.appended.notify_one();
        if self.fail {
            Err(UpstreamError::Status {
                service: "Google",
                status: 403,
                body: "The caller does not have permission".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
