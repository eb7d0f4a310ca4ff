use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::token::InvalidTokenReason;

/// Body the upstream uses to signal a tracking failure. We mirror it so that
/// fire-and-forget pixels and snippets never see a page error.
pub const FAILURE_BODY: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Validation,
    UpstreamNetwork,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Validation => "validation",
            ErrorKind::UpstreamNetwork => "upstream_network",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("request holds no data payload")]
    MissingPayload,
    #[error("data payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("failed to decode data payload: {0}")]
    InvalidEncoding(String),
    #[error("failed to parse data payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event.event is required")]
    MissingEventName,
    #[error("event.properties is required")]
    MissingProperties,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] InvalidTokenReason),

    #[error("failed to reach upstream: {0}")]
    UpstreamNetworkError(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::InvalidBase64(_)
            | ProxyError::InvalidEncoding(_)
            | ProxyError::InvalidJson(_) => ErrorKind::Decode,

            ProxyError::MissingPayload
            | ProxyError::MissingEventName
            | ProxyError::MissingProperties
            | ProxyError::InvalidToken(_) => ErrorKind::Validation,

            ProxyError::UpstreamNetworkError(_) => ErrorKind::UpstreamNetwork,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::Decode | ErrorKind::Validation => (StatusCode::OK, FAILURE_BODY),
            ErrorKind::UpstreamNetwork => (StatusCode::BAD_GATEWAY, FAILURE_BODY),
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::{ErrorKind, ProxyError, FAILURE_BODY};
    use crate::token::InvalidTokenReason;

    #[tokio::test]
    async fn validation_errors_answer_ok_with_zero() {
        let response = ProxyError::InvalidToken(InvalidTokenReason::NotWhitelisted).into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], FAILURE_BODY.as_bytes());
    }

    #[test]
    fn missing_payload_is_a_validation_error() {
        assert_eq!(ProxyError::MissingPayload.kind(), ErrorKind::Validation);
        assert_eq!(
            ProxyError::InvalidEncoding(String::from("bad")).kind(),
            ErrorKind::Decode
        );
    }
}
