//! HTTP API: the WhatsApp webhook plus diagnostics

mod handlers;
mod status;
mod types;

pub use handlers::create_router;
pub use status::{AnthropicProbe, Probes};

use crate::relay::{ChatLog, Relay};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Shared secret for subscription verification; unset rejects every attempt
    pub verify_token: Option<String>,
    /// Where answered exchanges are recorded, when configured
    pub chat_log: Option<Arc<dyn ChatLog>>,
    pub probes: Probes,
}
