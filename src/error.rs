// Photosync - Google Photos library synchronizer
// Copyright (C) 2025 Photosync contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for photosync.
//!
//! Errors are grouped by domain (auth, API, download, local I/O). A corrupt
//! manifest is never surfaced through this type: the manifest store recovers
//! from it internally (backup file, then an empty manifest). End of
//! pagination is likewise not an error; it is signalled by the absence of a
//! continuation token.

use thiserror::Error;

/// Result type alias using our SyncError type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for photosync
#[derive(Error, Debug)]
pub enum SyncError {
    // ===== Auth errors =====
    /// Token endpoint response lacked an access token, or the exchange itself
    /// was rejected. Fatal for the pass; never retried automatically.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        /// OAuth scope being authorized, if known
        scope: Option<String>,
    },

    // ===== API errors =====
    /// Non-2xx API response other than the cases below
    #[error("API request failed: {message}")]
    ApiRequestFailed {
        message: String,
        /// HTTP status code if available
        status_code: Option<u16>,
        /// Endpoint that failed
        endpoint: Option<String>,
    },

    /// API rate limiting (HTTP 429)
    #[error("rate limited by {endpoint}")]
    RateLimited {
        endpoint: String,
        /// Response body for debugging
        body: Option<String>,
    },

    /// Malformed request rejected by the API (HTTP 400)
    #[error("bad request to {endpoint}")]
    BadRequest {
        endpoint: String,
        body: Option<String>,
    },

    /// API returned a body we could not make sense of
    #[error("invalid API response: {message}")]
    InvalidApiResponse {
        message: String,
        response_body: Option<String>,
    },

    // ===== Download errors =====
    /// A single media transfer failed. The scheduler captures this per item
    /// and leaves the entry retryable.
    #[error("download failed for {id}: {message}")]
    DownloadFailed { id: String, message: String },

    // ===== Local errors =====
    /// A configured path is unusable (bad parent directory, invalid UTF-8)
    #[error("invalid path: {0}")]
    InvalidPath(String),

    // ===== External library errors =====
    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Create an AuthenticationFailed error
    pub fn auth_failed<S: Into<String>>(message: S, scope: Option<&str>) -> Self {
        SyncError::AuthenticationFailed {
            message: message.into(),
            scope: scope.map(Into::into),
        }
    }

    /// Create an ApiRequestFailed error
    pub fn api_failed<S: Into<String>>(
        message: S,
        status_code: Option<u16>,
        endpoint: Option<String>,
    ) -> Self {
        SyncError::ApiRequestFailed {
            message: message.into(),
            status_code,
            endpoint,
        }
    }

    /// Create a DownloadFailed error
    pub fn download_failed<S: Into<String>>(id: S, message: S) -> Self {
        SyncError::DownloadFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Whether a later pass might succeed without operator intervention.
    ///
    /// Rate limits and server-side failures clear on their own; auth and
    /// request-shape problems do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RateLimited { .. } => true,
            SyncError::ApiRequestFailed {
                status_code: Some(500..=599),
                ..
            } => true,
            SyncError::DownloadFailed { .. } => true,
            SyncError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the user needs to re-authorize the application
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::AuthenticationFailed { .. }
                | SyncError::ApiRequestFailed {
                    status_code: Some(401),
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        let rate = SyncError::RateLimited {
            endpoint: "mediaItems:search".to_string(),
            body: None,
        };
        assert!(rate.is_retryable());

        let server = SyncError::api_failed("boom", Some(503), None);
        assert!(server.is_retryable());

        let bad = SyncError::BadRequest {
            endpoint: "mediaItems:search".to_string(),
            body: None,
        };
        assert!(!bad.is_retryable());
    }

    #[test]
    fn auth_errors_are_flagged() {
        let auth = SyncError::auth_failed("no access token", Some("photoslibrary.readonly"));
        assert!(auth.is_auth_error());
        assert!(!auth.is_retryable());

        let unauthorized = SyncError::api_failed("expired", Some(401), None);
        assert!(unauthorized.is_auth_error());
    }
}
