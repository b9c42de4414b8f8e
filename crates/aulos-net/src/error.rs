use thiserror::Error;

/// Centralized error type for aulos-net.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Timeout")]
    Timeout,

    #[error("Partial file: got {got} of {expected} bytes for URL: {url}")]
    PartialFile { expected: u64, got: u64, url: String },

    #[error("Invalid range header: {0}")]
    InvalidRange(String),

    #[error("Request failed after {max_retries} retries: {source}")]
    RetryExhausted {
        max_retries: u32,
        source: Box<NetError>,
    },
}

impl NetError {
    /// Creates an HTTP status error.
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    /// Maps a reqwest error onto the taxonomy, keeping timeout and
    /// connect failures distinguishable for retry policy decisions.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }

    /// Whether this error is worth retrying at the same endpoint.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Http(_) | Self::PartialFile { .. } => false,
            Self::InvalidRange(_) | Self::RetryExhausted { .. } => false,
        }
    }

    /// Whether this error indicates a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Whether this error indicates a connect-level failure.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }

    /// The HTTP status code, if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type NetResult<T> = Result<T, NetError>;
