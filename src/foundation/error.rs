/// Convenience result type used across Inklay.
pub type InklayResult<T> = Result<T, InklayError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Validation errors are caller contract violations and fail fast; data
/// errors ([`InklayError::Decode`], [`InklayError::Compression`]) are reported
/// upward so the caller can decide on a recovery policy; resource errors
/// ([`InklayError::BudgetExceeded`], [`InklayError::Storage`]) carry no retry
/// of their own.
#[derive(thiserror::Error, Debug)]
pub enum InklayError {
    /// Invalid caller-provided data (out-of-range page index, missing entity).
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed stroke-blob payload.
    #[error("decode error: {0}")]
    Decode(String),

    /// Corrupt or truncated compressed payload, or an unknown algorithm tag.
    #[error("compression error: {0}")]
    Compression(String),

    /// A snapshot render would exceed the configured memory ceiling.
    #[error("memory budget exceeded: estimated {estimated_bytes} bytes over a {max_bytes} byte ceiling")]
    BudgetExceeded {
        /// Estimated peak bytes for the requested render.
        estimated_bytes: u64,
        /// Configured ceiling in bytes.
        max_bytes: u64,
    },

    /// Persistence failure (store unavailable, write failed).
    #[error("storage error: {0}")]
    Storage(String),

    /// An export was aborted; `page` is the zero-based page that failed.
    #[error("export aborted at page {page}: {reason}")]
    ExportAborted {
        /// Zero-based index of the page whose render or append failed.
        page: u32,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Cooperative cancellation or deadline expiry.
    #[error("operation canceled")]
    Canceled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InklayError {
    /// Build an [`InklayError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an [`InklayError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build an [`InklayError::Compression`] value.
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Build an [`InklayError::Storage`] value.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build an [`InklayError::ExportAborted`] value for `page`.
    pub fn export_aborted(page: u32, reason: impl Into<String>) -> Self {
        Self::ExportAborted {
            page,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
