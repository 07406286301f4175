use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid resource URL: {0}")]
    InvalidUrl(String),

    #[error("Access denied ({status}): {body}")]
    AccessDenied { status: u16, body: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let cut: String = text.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let body = Self::truncate_body(body);
        match status {
            401 | 403 => FetchError::AccessDenied { status, body },
            404 | 410 => FetchError::NotFound(body),
            429 => FetchError::RateLimited,
            500..=599 => FetchError::ServerError { status, body },
            _ => FetchError::UnexpectedStatus { status, body },
        }
    }

    /// True when no HTTP response was obtained at all.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Timeout | FetchError::Unreachable(_)
        )
    }
}
