//! HTTP handlers.

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use domain_mail::{DeliveryQueue, HtmlDocument, PostResponseHooks, Priority};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

/// Body of `POST /api/notifications`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationRequest {
    pub recipient: String,
    pub subject: String,
    /// Trusted HTML fragment; not sanitized.
    pub html: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Returned with `202 Accepted`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationAccepted {
    /// Documents waiting in this request's queue.
    pub queued: usize,
}

/// Queue one notification for delivery after this response.
///
/// Delivery problems (bad recipient, render or SMTP failures) happen after
/// the response and only show up in the logs.
pub async fn create_notification(
    Extension(queue): Extension<DeliveryQueue>,
    Extension(hooks): Extension<PostResponseHooks>,
    Json(request): Json<NotificationRequest>,
) -> Response {
    if request.recipient.trim().is_empty() || request.subject.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "recipient and subject are required" })),
        )
            .into_response();
    }

    info!(
        recipient = %request.recipient,
        subject = %request.subject,
        priority = ?request.priority,
        "Notification accepted"
    );

    let document =
        HtmlDocument::new(request.recipient, request.subject, request.html).with_priority(request.priority);
    queue.enqueue(document, &hooks);

    (
        StatusCode::ACCEPTED,
        Json(NotificationAccepted { queued: queue.len() }),
    )
        .into_response()
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: the configured transport must accept mail.
pub async fn ready(State(state): State<AppState>) -> Response {
    let transport = state.mailer.transport();
    match transport.health_check().await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "transport": transport.name() })),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "transport": transport.name() })),
        )
            .into_response(),
        Err(e) => {
            warn!(transport = transport.name(), error = %e, "Transport health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "transport": transport.name(),
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
