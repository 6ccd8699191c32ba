//! Error types for the OpenML client.

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum OpenMlError {
    /// Credentials rejected, missing, or re-authentication failed.
    #[error("authentication failed: {message}")]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("api error (HTTP {status}): {message}")]
    Api {
        status: u16,
        /// OpenML error code from the `<oml:error>` body, when present.
        code: Option<u32>,
        message: String,
    },

    /// Entity does not exist remotely (or is not cached, for cache-only reads).
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: u64 },

    /// Writing a cache entry failed; the cache is unchanged.
    #[error("cache write failed: {message}")]
    CacheWrite { message: String },

    /// Reading a cache entry failed.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Data file does not match the checksum in its description.
    #[error("checksum mismatch for dataset {id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        id: u64,
        expected: String,
        actual: String,
    },

    /// Payload could not be parsed.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Transport failure (connect, timeout, body read).
    #[error("network error: {message}")]
    Network { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A batch item's background task ended without reporting a result.
    #[error("download interrupted: {message}")]
    Interrupted { message: String },
}

impl OpenMlError {
    pub(crate) fn not_found(resource: impl Into<String>, id: u64) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id,
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Whether the entity is known not to exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a caller-side retry could succeed.
    ///
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OpenMlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::Error> for OpenMlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::InvalidResponse {
            message: format!("malformed xml: {}", err),
        }
    }
}

/// Result type for client operations.
pub type OpenMlResult<T> = Result<T, OpenMlError>;
