//! WhatsApp Cloud API: outbound client and inbound webhook decoding

mod client;
mod webhook;

pub use client::{SendReceipt, WhatsAppClient};
pub use webhook::{verify_subscription, InboundMessage, Verification, VerifyQuery, WebhookEvent};
