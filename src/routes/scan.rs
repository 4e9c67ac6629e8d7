//! Scan and suggestion endpoints. Each answers with a single server-sent
//! event named `response` once the whole pipeline has finished.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use serde_json::Value;
use tokio_stream::Once;

use crate::errors::AppError;
use crate::models::request::RequestKind;
use crate::services::dispatcher::{INVALID_JSON, INVALID_REQUEST_TYPE};
use crate::AppState;

pub type ResponseStream = Sse<KeepAliveStream<Once<Result<Event, Infallible>>>>;

/// POST /scan: resolve templates and stream the scan result.
pub async fn scan(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<ResponseStream, AppError> {
    respond(&state, RequestKind::ScanRequest, &body).await
}

/// POST /suggest: ask the oracle for template directories.
pub async fn suggest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<ResponseStream, AppError> {
    respond(&state, RequestKind::SuggestTemplates, &body).await
}

/// Decode a body and check its `type` against the endpoint.
///
/// A missing `type` is filled in from the endpoint; a different one is
/// rejected before anything runs.
pub fn decode_body(kind: RequestKind, body: &[u8]) -> Result<Value, AppError> {
    let mut value: Value =
        serde_json::from_slice(body).map_err(|_| AppError::Validation(INVALID_JSON.to_string()))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| AppError::Validation("Request body must be a JSON object".to_string()))?;

    match object.get("type") {
        None => {
            object.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        }
        Some(Value::String(t)) if t == kind.as_str() => {}
        Some(_) => return Err(AppError::Validation(INVALID_REQUEST_TYPE.to_string())),
    }

    Ok(value)
}

async fn respond(
    state: &AppState,
    kind: RequestKind,
    body: &[u8],
) -> Result<ResponseStream, AppError> {
    let value = decode_body(kind, body)?;
    let message = state.dispatcher.handle(kind, value).await;

    let event = Event::default()
        .event("response")
        .json_data(&message)
        .map_err(|e| AppError::Internal(format!("Failed to encode response event: {e}")))?;

    Ok(Sse::new(tokio_stream::once(Ok(event))).keep_alive(KeepAlive::default()))
}
