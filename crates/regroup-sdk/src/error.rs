//! Errors surfaced by platform collaborators

use std::time::Duration;

/// Error returned by any remote platform call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Requested resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Resource with the same identity already exists
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Request was rejected as malformed
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Caller lacks the rights for the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Remote quota exceeded
    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// Remote side temporarily unavailable
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// No response within the transport deadline
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Remote side failed while handling the request
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Check if the failure may go away on its own and is worth retrying
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests(_) | Self::Unavailable(_) | Self::Timeout(_) | Self::Internal(_)
        )
    }

    /// Check if the error reports a missing resource
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
