use std::future::Future;

use axum::http::{header::HeaderMap, HeaderValue};
use axum::response::Response;
use huddle_common::protocol::ws::ServerEvent;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Error codes surfaced over the WebSocket error channel.
///
/// Dropped events (not-found targets, persistence failures) produce no
/// error frame at all — absence of the expected broadcast is the only
/// observable symptom. The codes below cover the cases where the hub
/// does answer the offending connection directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Frame was not valid JSON or not a known event shape.
    InvalidEvent,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEvent => "HUB_INVALID_EVENT",
        }
    }

    pub const fn retryable(self) -> bool {
        match self {
            Self::InvalidEvent => false,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::InvalidEvent => "invalid websocket event payload",
        }
    }
}

/// Build a server `error` event for the given code.
pub fn error_event(code: ErrorCode, message: impl Into<String>) -> ServerEvent {
    ServerEvent::Error {
        code: code.as_str().to_string(),
        message: message.into(),
        retryable: code.retryable(),
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_carries_code_and_retryability() {
        let event = error_event(ErrorCode::InvalidEvent, "bad frame");
        match event {
            ServerEvent::Error { code, message, retryable } => {
                assert_eq!(code, "HUB_INVALID_EVENT");
                assert_eq!(message, "bad frame");
                assert!(!retryable);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn invalid_event_is_not_retryable() {
        assert!(!ErrorCode::InvalidEvent.retryable());
    }

    #[tokio::test]
    async fn request_id_scope_is_visible_inside_future() {
        let seen = with_request_id_scope("req-123".to_owned(), async { current_request_id() })
            .await;
        assert_eq!(seen.as_deref(), Some("req-123"));
        assert!(current_request_id().is_none());
    }

    #[test]
    fn request_id_falls_back_to_generated_uuid() {
        let headers = HeaderMap::new();
        let id = request_id_from_headers_or_generate(&headers);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn request_id_prefers_incoming_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-from-client"));
        assert_eq!(request_id_from_headers_or_generate(&headers), "req-from-client");
    }
}
