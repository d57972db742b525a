//! WhatsApp relay
//!
//! Answers WhatsApp Business messages with a language model grounded on a
//! Google Doc, and records each exchange in a Google Sheet.

mod api;
mod config;
mod conversation;
mod error;
mod google;
mod knowledge;
mod llm;
mod relay;
mod responder;
mod whatsapp;

use api::{create_router, AnthropicProbe, AppState, Probes};
use config::Config;
use conversation::InMemoryConversationStore;
use google::{GoogleAuth, GoogleDocsSource, GoogleSheetsLog};
use knowledge::KnowledgeCache;
use llm::{AnthropicService, LlmService, LoggingService};
use relay::{ChatLog, Relay};
use responder::Responder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whatsapp::WhatsAppClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whatsapp_relay=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    let llm = build_llm(&config)?;
    let whatsapp = Arc::new(WhatsAppClient::new(config.whatsapp.clone())?);
    let google = Arc::new(GoogleAuth::new(&config.google)?);

    let knowledge = KnowledgeCache::new(Arc::new(GoogleDocsSource::new(
        google.clone(),
        config.google.knowledge_doc_id.clone(),
    )));
    let chat_log = config.google.log_sheet_id.clone().map(|sheet_id| {
        Arc::new(GoogleSheetsLog::new(google.clone(), sheet_id)) as Arc<dyn ChatLog>
    });
    if chat_log.is_none() {
        tracing::warn!("GOOGLE_SHEET_ID_LOGS not set; exchanges will not be logged");
    }

    let relay = Relay::new(
        Arc::new(InMemoryConversationStore::new()),
        Arc::new(knowledge),
        Responder::new(llm.clone()),
        whatsapp.clone(),
    );

    let state = AppState {
        relay: Arc::new(relay),
        verify_token: config.verify_token.clone(),
        chat_log,
        probes: Probes {
            whatsapp,
            anthropic: Arc::new(AnthropicProbe::new(llm)),
            google,
        },
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("WhatsApp relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The model client, or `None` when neither an API key nor a gateway is set
fn build_llm(config: &Config) -> Result<Option<Arc<dyn LlmService>>, llm::LlmError> {
    let llm = &config.llm;
    if llm.anthropic_api_key.is_none() && llm.gateway.is_none() {
        tracing::warn!("No LLM configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
        return Ok(None);
    }

    let service = AnthropicService::new(
        llm.anthropic_api_key.clone().unwrap_or_default(),
        llm.model.clone(),
        llm.gateway.as_deref(),
    )?;
    tracing::info!(model = %llm.model, gateway = llm.gateway.is_some(), "LLM initialized");

    Ok(Some(Arc::new(LoggingService::new(Arc::new(service)))))
}
