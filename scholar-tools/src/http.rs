//! HTTP plumbing shared by the search adapters.

use reqwest::{Client, StatusCode};
use scholar_core::error::ProviderError;
use std::time::Duration;
use tracing::debug;

/// Longest error body excerpt carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

pub(crate) fn build_client(provider: &str, timeout_secs: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("Scholar/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Request {
            provider: provider.to_string(),
            message: format!("Failed to build HTTP client: {e}"),
        })
}

/// Map a non-success HTTP status to a provider error.
pub(crate) fn map_http_error(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => {
            debug!(provider, status = status.as_u16(), body = %body, "Search credential rejected");
            ProviderError::Unauthorized {
                provider: provider.to_string(),
            }
        }
        429 => ProviderError::RateLimited {
            provider: provider.to_string(),
        },
        _ => {
            let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            ProviderError::Request {
                provider: provider.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            }
        }
    }
}

/// Map a transport failure to a provider error.
pub(crate) fn map_transport_error(
    provider: &str,
    err: reqwest::Error,
    timeout_secs: u64,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_secs,
        }
    } else {
        ProviderError::Request {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

pub(crate) fn parse_json(provider: &str, body: &str) -> Result<serde_json::Value, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::ResponseParse {
        provider: provider.to_string(),
        message: format!("Invalid JSON: {e}"),
    })
}
