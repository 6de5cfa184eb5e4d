//! HTTP surface for webhook ingestion.
//!
//! Endpoints:
//! - `POST /webhook`: ingest one delivery
//! - `GET /health`: liveness check
//! - `GET /surveys/:survey_id/metrics`: current CSAT/NPS buckets for a survey
//!
//! Status mapping for `POST /webhook`:
//! - 200 for a stored or duplicate delivery (identical bodies)
//! - 400 malformed payload, 422 score out of range
//! - 403/400/501/401 for signature failures
//! - 503 for retryable store failures and timeouts, 500 otherwise

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::signature::{SignatureVerifier, SIGNATURE_HEADER};
use crate::aggregation::MetricBucket;
use crate::decoder::DecodeError;
use crate::services::{IngestError, IngestService};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    ingest: IngestService,
    verifier: Option<Arc<SignatureVerifier>>,
}

impl AppState {
    pub fn new(ingest: IngestService, verifier: Option<SignatureVerifier>) -> Self {
        Self {
            ingest,
            verifier: verifier.map(Arc::new),
        }
    }
}

/// Start the HTTP server on `addr` until `shutdown` resolves.
///
/// When the port is 0, the OS assigns an ephemeral port. The actual bound
/// address is always logged so it can be discovered.
pub async fn serve<F>(
    state: AppState,
    addr: &str,
    max_body_bytes: usize,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(address = %local, "Webhook endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/webhook", post(receive))
        .route("/health", get(health))
        .route("/surveys/:survey_id/metrics", get(survey_metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(verifier) = &state.verifier {
        // A header that is not visible ASCII cannot be a valid signature.
        let header = headers
            .get(SIGNATURE_HEADER)
            .map(|value| value.to_str().unwrap_or_default());
        if let Err(e) = verifier.verify(header, &body) {
            warn!(error = %e, outcome = "rejected", "Signature check failed");
            return ErrorBody::new("invalid_signature", e.to_string()).into_response_with(e.status_code());
        }
    }

    match state.ingest.ingest(&body).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(Ack {
                status: "accepted",
                event_id: outcome.event_id().to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            let (status, code) = error_status(&e);
            ErrorBody::new(code, e.to_string()).into_response_with(status)
        }
    }
}

async fn survey_metrics(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
) -> Result<Json<Vec<BucketSummary>>, StatusCode> {
    let buckets = state
        .ingest
        .store()
        .list_buckets(Some(&survey_id))
        .await
        .map_err(|e| {
            error!(survey_id = %survey_id, error = %e, "Failed to list buckets");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(buckets.into_iter().map(BucketSummary::from).collect()))
}

/// HTTP status and error code for a failed delivery.
fn error_status(err: &IngestError) -> (StatusCode, &'static str) {
    match err {
        IngestError::Rejected(DecodeError::MalformedPayload(_)) => {
            (StatusCode::BAD_REQUEST, "malformed_payload")
        }
        IngestError::Rejected(DecodeError::ScoreOutOfRange { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "score_out_of_range")
        }
        IngestError::Failed(_) if err.is_retryable() => {
            (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
        }
        IngestError::Failed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        IngestError::TimedOut(_) => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Body for every successful delivery, fresh or duplicate.
#[derive(Debug, Serialize)]
struct Ack {
    status: &'static str,
    event_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ErrorBody {
    fn new(error: &'static str, message: String) -> Self {
        Self { error, message }
    }

    fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// A bucket with its derived score.
#[derive(Debug, Serialize)]
struct BucketSummary {
    #[serde(flatten)]
    bucket: MetricBucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nps: Option<f64>,
}

impl From<MetricBucket> for BucketSummary {
    fn from(bucket: MetricBucket) -> Self {
        Self {
            mean: bucket.mean(),
            nps: bucket.nps_score(),
            bucket,
        }
    }
}
