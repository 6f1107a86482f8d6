//! Error type for the scraping API client.

use thiserror::Error;

/// Errors from building the client, talking to the API, and decoding its payloads.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No API key configured. Pass --api-key, set PILOTERR_API_KEY, or add api_key to the config file.")]
    MissingApiKey,

    #[error("API key contains characters that cannot be sent in an HTTP header.")]
    InvalidApiKey,

    #[error("Failed to create HTTP client: {source}")]
    Client { source: reqwest::Error },

    #[error("Invalid API endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    // Transport
    #[error("Network error: could not reach {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    // Payload
    #[error("Could not decode response text: {reason}")]
    Decode { reason: String },

    #[error("Invalid JSON in response: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// True for failures of the request itself rather than of its payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Transport { .. } | ApiError::HttpStatus { .. } | ApiError::BodyRead { .. }
        )
    }
}
