//! The `/v1/messages` endpoint.
//!
//! Accepts the Anthropic Messages API shape and answers with either a
//! single JSON response or a `text/event-stream` body carrying the
//! Anthropic event grammar, depending on `stream`. A dropped client
//! connection cancels the in-flight upstream work through the request's
//! cancellation token.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{ProxyError, Result};
use crate::models::request::MessagesRequest;
use crate::AppState;

/// POST `/v1/messages`.
#[instrument(skip(state, request), fields(model = %request.model, stream = request.is_streaming()))]
pub async fn handle_messages(
    State(state): State<AppState>,
    Json(request): Json<MessagesRequest>,
) -> Result<Response> {
    validate(&request)?;

    // Dropping the guard (client went away, handler future dropped)
    // cancels the upstream work.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    if request.is_streaming() {
        let stream = state.dispatcher.stream(&request, cancel.clone()).await?;
        let events = stream.map(|event| {
            Ok::<_, Infallible>(
                Event::default()
                    .event(event.event_type())
                    .json_data(&event)
                    .unwrap_or_else(|_| Event::default().event("ping").data("{}")),
            )
        });
        debug!("Streaming response started");
        Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response())
    } else {
        let response = state.dispatcher.send(&request, cancel.clone()).await?;
        Ok(Json(response).into_response())
    }
}

/// Reject requests the dispatcher cannot serve.
fn validate(request: &MessagesRequest) -> Result<()> {
    if request.model.trim().is_empty() {
        return Err(ProxyError::InvalidRequest("model is required".to_string()));
    }
    if request.messages.is_empty() {
        return Err(ProxyError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_minimal_request() {
        let request = MessagesRequest::simple("claude-sonnet-4-5", 1024, "Hello");
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_model() {
        let request = MessagesRequest::simple("  ", 1024, "Hello");
        assert!(matches!(
            validate(&request),
            Err(ProxyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let request = MessagesRequest {
            messages: vec![],
            ..MessagesRequest::simple("claude-sonnet-4-5", 1024, "x")
        };
        assert!(matches!(
            validate(&request),
            Err(ProxyError::InvalidRequest(_))
        ));
    }
}
