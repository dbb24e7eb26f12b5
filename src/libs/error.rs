//! Error types for the attendance API boundary.
//!
//! Domain rejections carry no state mutation and are surfaced to the caller
//! as-is; store failures abort the enclosing transaction and are grouped
//! under the `STORE_ERROR` family for the transport layer.

use thiserror::Error;

/// All errors the attendance API can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("user is not checked in")]
    NotCheckedIn,

    #[error("user is already checked in")]
    AlreadyCheckedIn,

    #[error("user is already checked out")]
    AlreadyCheckedOut,

    #[error("a lunch break is already in progress")]
    BreakAlreadyStarted,

    #[error("no lunch break is in progress")]
    NoActiveBreak,

    #[error("checked out automatically after prolonged agent silence")]
    AutoCheckedOut,

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results at the API boundary.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Stable machine-readable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotCheckedIn => "NOT_CHECKED_IN",
            ApiError::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            ApiError::AlreadyCheckedOut => "ALREADY_CHECKED_OUT",
            ApiError::BreakAlreadyStarted => "BREAK_ALREADY_STARTED",
            ApiError::NoActiveBreak => "NO_ACTIVE_BREAK",
            ApiError::AutoCheckedOut => "AUTO_CHECKED_OUT",
            ApiError::Store(_) => "STORE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for business-rule rejections that warrant no retry.
    pub fn is_domain_rejection(&self) -> bool {
        !matches!(self, ApiError::Store(_) | ApiError::Internal(_))
    }
}
