//! HTTP request handlers

use super::status::ProbeTarget;
use super::types::{BuildInfo, ErrorResponse, StatusQuery, StatusResponse, WebhookAck};
use super::AppState;
use crate::relay::{ChatRecord, Outcome};
use crate::whatsapp::{verify_subscription, Verification, VerifyQuery, WebhookEvent};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use tracing::Instrument;

/// Path Meta is configured with in existing deployments
const LEGACY_WEBHOOK_PATH: &str = "/.netlify/functions/whatsapp-webhook";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let webhook = get(verify_webhook)
        .post(receive_webhook)
        .fallback(method_not_allowed);

    Router::new()
        .route("/webhook", webhook.clone())
        .route(LEGACY_WEBHOOK_PATH, webhook)
        .route("/api/status", get(service_status))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Subscription Verification
// ============================================================

async fn verify_webhook(
    State(state): State<AppState>,
    query: Option<Query<VerifyQuery>>,
) -> Result<String, AppError> {
    let query = query.map(|Query(q)| q).unwrap_or_default();

    match verify_subscription(&query, state.verify_token.as_deref()) {
        Verification::Verified(challenge) => {
            tracing::info!("Webhook verified successfully");
            Ok(challenge)
        }
        Verification::Rejected(reason) => {
            tracing::warn!(reason = reason.as_str(), "Webhook verification failed");
            Err(AppError::Forbidden("Verification failed"))
        }
        Verification::MissingParameters => {
            tracing::warn!("Webhook verification request missing parameters");
            Err(AppError::BadRequest("Missing query parameters"))
        }
    }
}

// ============================================================
// Message Delivery
// ============================================================

async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let delivery_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("webhook", %delivery_id);
    process_delivery(&state, &body).instrument(span).await
}

async fn process_delivery(state: &AppState, body: &[u8]) -> Result<Json<WebhookAck>, AppError> {
    let event = WebhookEvent::decode(body).map_err(|e| {
        tracing::error!(error = %e, "Malformed webhook payload");
        AppError::Internal
    })?;

    let message = match event {
        WebhookEvent::Message(message) => message,
        WebhookEvent::NoMessage { field, statuses } => {
            tracing::info!(
                field = field.as_deref().unwrap_or("none"),
                statuses = statuses.len(),
                "No messages in webhook"
            );
            return Ok(Json(WebhookAck::success()));
        }
    };

    tracing::info!(
        sender = %message.sender_id,
        name = message.sender_name.as_deref().unwrap_or(""),
        kind = %message.kind,
        "Incoming message"
    );

    match state.relay.handle(&message).await {
        Ok(Outcome::Replied(record)) => spawn_chat_log(state, record),
        Ok(Outcome::TemplateSent | Outcome::Skipped) => {}
        Err(e) => {
            tracing::error!(sender = %message.sender_id, error = %e, "Webhook processing failed");
            if e.allows_free_form_reply() {
                state.relay.apologize(&message.sender_id).await;
            }
            return Err(AppError::Internal);
        }
    }

    Ok(Json(WebhookAck::success()))
}

/// Record the exchange without holding up the response
fn spawn_chat_log(state: &AppState, record: ChatRecord) {
    let Some(log) = state.chat_log.clone() else {
        tracing::debug!("Chat log not configured; skipping");
        return;
    };

    tokio::spawn(
        async move {
            if let Err(e) = log.append(&record).await {
                tracing::warn!(sender = %record.sender, error = %e, "Failed to log chat");
            }
        }
        .in_current_span(),
    );
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

// ============================================================
// Diagnostics
// ============================================================

async fn service_status(
    State(state): State<AppState>,
    query: Option<Query<StatusQuery>>,
) -> Json<StatusResponse> {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let target = ProbeTarget::parse(query.api.as_deref());

    Json(StatusResponse {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        services: state.probes.run(target).await,
        build_info: BuildInfo {
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn get_version() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

/// Handler failures. Bodies are fixed strings; details only go to the log.
#[derive(Debug)]
enum AppError {
    BadRequest(&'static str),
    Forbidden(&'static str),
    MethodNotAllowed,
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
