//! Inbound webhook boundary
//!
//! POST-only endpoint for provider transaction events. Signature
//! verification runs before anything else touches the payload; recognized
//! events flow into the pipeline, everything else is acknowledged and
//! ignored so the provider does not retry. The provider treats any non-2xx
//! as retryable, so: 401 for auth failures, 405 for wrong methods, 400 for
//! an event with no transaction id, 200 for processed or intentionally
//! ignored events, and 500 for internal failures (including the handler
//! timeout) so the provider redelivers.

use crate::metrics::PipelineMetrics;
use crate::pipeline::{ProcessOutcome, TransactionPipeline};
use crate::signature::SignatureValidator;
use crate::types::{EventKind, WebhookEnvelope};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TransactionPipeline>,
    pub validator: Arc<SignatureValidator>,
    pub metrics: Arc<PipelineMetrics>,
    /// Name of the header carrying the hex HMAC digest
    pub signature_header: String,
    /// Overall handler budget; elapsed maps to 500
    pub timeout: Duration,
}

/// Build the service router. Non-POST methods on the webhook route get 405
/// from the method router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/transactions", post(receive_webhook))
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Authentication strictly precedes all business logic
    let signature = headers
        .get(state.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    let Some(signature) = signature else {
        state.metrics.record_signature_rejection();
        warn!(header = %state.signature_header, "Webhook rejected: missing signature header");
        return reject(StatusCode::UNAUTHORIZED, "missing signature");
    };

    if !state.validator.validate(&body, signature) {
        state.metrics.record_signature_rejection();
        warn!("Webhook rejected: invalid signature");
        return reject(StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Webhook rejected: malformed payload");
            return reject(StatusCode::BAD_REQUEST, "malformed payload");
        }
    };

    match envelope.kind() {
        EventKind::TransactionCreated => {}
        EventKind::Other => {
            // Acknowledge so the provider does not retry unrelated events
            debug!(event_type = %envelope.event_type, "Acknowledging unhandled event type");
            return (
                StatusCode::OK,
                Json(WebhookAck {
                    status: "ignored",
                    alert: None,
                }),
            )
                .into_response();
        }
    }

    let transaction = match envelope.into_payload().normalize() {
        Ok(transaction) => transaction,
        Err(_) => {
            warn!("Webhook rejected: event carries no transaction id");
            return reject(StatusCode::BAD_REQUEST, "missing transaction id");
        }
    };

    match tokio::time::timeout(state.timeout, state.pipeline.process(transaction)).await {
        Ok(Ok(ProcessOutcome::Duplicate)) => (
            StatusCode::OK,
            Json(WebhookAck {
                status: "duplicate",
                alert: None,
            }),
        )
            .into_response(),
        Ok(Ok(ProcessOutcome::Processed { alerted, .. })) => (
            StatusCode::OK,
            Json(WebhookAck {
                status: "processed",
                alert: Some(alerted),
            }),
        )
            .into_response(),
        Ok(Err(e)) => {
            // Surfaced as 5xx so the provider retries; masking internal
            // failures as 200 would silently drop legitimate alerts
            error!(error = %e, "Pipeline failure processing webhook");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal failure")
        }
        Err(_) => {
            error!(timeout_ms = state.timeout.as_millis() as u64, "Webhook handler timed out");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "processing timed out")
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn model_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.model_info())
}
