//! Reply generation: prompt assembly, one model call, and cleanup of the
//! model's markdown into something that reads well in a WhatsApp bubble.

use crate::conversation::Turn;
use crate::llm::{LlmMessage, LlmRequest, LlmService, MessageRole, SystemContent};
use chrono::{Local, NaiveDate};
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

/// Sent instead of a model reply whenever generation fails
pub const APOLOGY: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again in a moment.";

const MAX_OUTPUT_TOKENS: u32 = 1000;

/// History turns included in the prompt
const HISTORY_WINDOW: usize = 6;

const INSTRUCTIONS: &str = r#"You are the best closing salesman for this business, and you are an expert at helping people set appointments.

Answer general questions about services, pricing, and policies directly from the reference material below.

- Do NOT include any preamble such as "Based on the document you provided" or "Okay, [Name]." Jump straight to the answer.
- Never mention documents or reference material, and don't mention today's date unless asked.
- Before offering to book, confirm the customer wants an appointment, their zip code is in a service area, and they have a serviceable appliance.
- Keep replies short enough to read comfortably in a chat message."#;

pub struct Responder {
    llm: Option<Arc<dyn LlmService>>,
}

impl Responder {
    pub fn new(llm: Option<Arc<dyn LlmService>>) -> Self {
        Self { llm }
    }

    /// Produce a reply for `current`. Never fails: any problem yields [`APOLOGY`].
    pub async fn generate(&self, current: &str, knowledge: &str, history: &[Turn]) -> String {
        let Some(llm) = &self.llm else {
            tracing::warn!("No language model configured; replying with apology");
            return APOLOGY.to_string();
        };

        let request = build_request(current, knowledge, history, Local::now().date_naive());

        match llm.complete(&request).await {
            Ok(response) => {
                let Some(raw) = response.first_text() else {
                    tracing::warn!("Model response had no text block");
                    return APOLOGY.to_string();
                };
                let cleaned = clean_response(raw);
                if cleaned.is_empty() {
                    tracing::warn!("Model reply was empty after cleanup");
                    APOLOGY.to_string()
                } else {
                    cleaned
                }
            }
            Err(e) => {
                tracing::warn!(error = %e.message, kind = e.kind.as_str(), "Reply generation failed");
                APOLOGY.to_string()
            }
        }
    }
}

/// Assemble the model request.
///
/// The instructions and knowledge go in a cacheable system block; the date
/// and the question change per call and follow in a second block.
fn build_request(current: &str, knowledge: &str, history: &[Turn], today: NaiveDate) -> LlmRequest {
    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    // The Messages API wants the conversation to open with a user turn
    let mut messages: Vec<LlmMessage> = window
        .iter()
        .skip_while(|turn| turn.role == MessageRole::Assistant)
        .map(|turn| LlmMessage {
            role: turn.role,
            text: turn.text.clone(),
        })
        .collect();

    let already_last = messages
        .last()
        .is_some_and(|m| m.role == MessageRole::User && m.text == current);
    if !already_last {
        messages.push(LlmMessage::user(current));
    }

    let date = today.format("%B %-d, %Y");
    LlmRequest {
        system: vec![
            SystemContent::cached(format!("{INSTRUCTIONS}\n\n{knowledge}")),
            SystemContent::new(format!(
                "Today's date is: {date}\n\nUser's question:\n{current}"
            )),
        ],
        messages,
        max_tokens: Some(MAX_OUTPUT_TOKENS),
    }
}

/// Emphasis markers, or a bare URL to keep as-is (group 1)
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://[^\s*~]*[^\s*~_])|[*_~]+").expect("invalid emphasis regex")
});

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\((https?://[^\s)]+)\)").expect("invalid link regex")
});

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("invalid blank-line regex"));

static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.*?based on the document you provided[,:]?\s*")
        .expect("invalid preamble regex")
});

/// Flatten model markdown for WhatsApp:
/// turn `[label](url)` into `label url`, strip emphasis markers outside
/// URLs, collapse blank-line runs, and drop a "based on the document you
/// provided" opener.
pub fn clean_response(text: &str) -> String {
    let text = LINK.replace_all(text, "$1 $2");
    let text = EMPHASIS.replace_all(&text, |caps: &Captures| {
        caps.get(1).map_or("", |url| url.as_str()).to_string()
    });
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    let text = PREAMBLE.replace(text.trim(), "");
    text.into_owned()
}
