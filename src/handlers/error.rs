// src/handlers/error.rs
use std::fmt;
use warp::http::StatusCode;
use warp::reject::Reject;

use crate::services::provider::ProviderError;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            hint: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Unreachable provider is a 503, a provider that answered with an error a 502.
    pub fn provider(err: &ProviderError) -> Self {
        let status = if err.is_transport() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_GATEWAY
        };
        ApiError {
            status,
            message: err.to_string(),
            hint: Some(err.hint().to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_gateway_statuses() {
        let transport = ProviderError::Transport {
            url: "https://api.polygon.io/v2".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(ApiError::provider(&transport).status, StatusCode::SERVICE_UNAVAILABLE);

        let remote = ProviderError::remote(401, Some("Unauthorized"), "");
        let api = ApiError::provider(&remote);
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert!(api.hint.unwrap().contains("credentials"));
    }
}
