use thiserror::Error;

/// Type alias for Result with RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error types for the mailbox-to-chat relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The stored credential was rejected by the provider (HTTP 401)
    #[error("Invalid credentials: {0}")]
    Unauthorized(String),

    /// The credential cannot be refreshed and interactive re-authorization
    /// is not available. Operator action is required.
    #[error("Token expired or revoked: {0}")]
    TokenExpired(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Chat delivery failed
    #[error("Notification error: {0}")]
    NotificationError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RelayError {
    /// Transient errors leave the stored credential alone and are retried
    /// on the next polling cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::RateLimitExceeded { .. }
                | RelayError::ServerError { .. }
                | RelayError::NetworkError(_)
        )
    }

    /// Whether the rendered message looks like an expired or revoked credential
    pub fn is_credential_error(&self) -> bool {
        crate::credentials::is_credential_error(&self.to_string())
    }
}

/// Seconds to wait from a `Retry-After` header; only the integer form counts
fn retry_after_secs(headers: &hyper::HeaderMap) -> u64 {
    headers
        .get(hyper::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Map a Gmail API status code onto the error the credential manager and
/// the monitor act on
fn from_status(status: hyper::StatusCode, headers: &hyper::HeaderMap) -> RelayError {
    let message = format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );

    match status.as_u16() {
        401 => RelayError::Unauthorized(message),
        429 => RelayError::RateLimitExceeded {
            retry_after: retry_after_secs(headers),
        },
        404 => RelayError::MessageNotFound("Resource not found".to_string()),
        400 => RelayError::BadRequest(message),
        403 => RelayError::Forbidden(message),
        code @ 500..=599 => RelayError::ServerError {
            status: code,
            message,
        },
        _ => RelayError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for RelayError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                from_status(response.status(), response.headers())
            }
            // JSON error body, e.g. {"status": "UNAUTHENTICATED"}
            google_gmail1::Error::BadRequest(ref err) => {
                let rendered = err.to_string();
                if crate::credentials::is_credential_error(&rendered) {
                    RelayError::Unauthorized(rendered)
                } else {
                    RelayError::BadRequest(rendered)
                }
            }
            google_gmail1::Error::MissingToken(ref err) => {
                RelayError::AuthError(format!("Missing token: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                RelayError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => RelayError::NetworkError(err.to_string()),
            _ => RelayError::ApiError(error.to_string()),
        }
    }
}

impl From<teloxide::RequestError> for RelayError {
    fn from(error: teloxide::RequestError) -> Self {
        match error {
            teloxide::RequestError::Network(ref err) => {
                RelayError::NetworkError(format!("Telegram: {}", err))
            }
            teloxide::RequestError::RetryAfter(seconds) => RelayError::RateLimitExceeded {
                retry_after: seconds.seconds() as u64,
            },
            other => RelayError::NotificationError(other.to_string()),
        }
    }
}
