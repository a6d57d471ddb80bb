/// error.rs – Error taxonomy for backend communication.
///
/// Three failure classes with different surfacing policies:
///  - `Transport`: network unreachable or unexpected non-2xx; surfaced only to
///    the caller that issued the request (stale data beats no data).
///  - `Decode`: malformed payload; on the event stream this is swallowed
///    locally after logging so one bad message cannot kill the feed.
///  - `Auth`: 401/403; surfaced to the view layer as a distinct
///    "re-authenticate" condition rather than a generic failure.
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("authentication rejected (HTTP {0})")]
    Auth(StatusCode),
}

impl ApiError {
    /// Classify a non-2xx response status.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(status),
            _ => ApiError::Transport(format!("unexpected HTTP status {status}")),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_classify_as_auth() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED).is_auth());
        assert!(ApiError::from_status(StatusCode::FORBIDDEN).is_auth());
    }

    #[test]
    fn other_statuses_classify_as_transport() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_auth());
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
