//! Error taxonomy shared by every chat operation.

use thiserror::Error;

pub type ChatResult<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad user input: {0}")]
    BadUserInput(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        ChatError::Forbidden(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ChatError::NotFound(what.into())
    }

    pub fn bad_input(reason: impl Into<String>) -> Self {
        ChatError::BadUserInput(reason.into())
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        ChatError::FailedPrecondition(reason.into())
    }

    /// Stable code surfaced to clients regardless of transport.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Unauthenticated => "UNAUTHENTICATED",
            ChatError::Forbidden(_) => "FORBIDDEN",
            ChatError::NotFound(_) => "NOT_FOUND",
            ChatError::BadUserInput(_) => "BAD_USER_INPUT",
            ChatError::FailedPrecondition(_) => "FAILED_PRECONDITION",
            ChatError::RateLimited(_) => "RATE_LIMITED",
            ChatError::Internal(_) => "INTERNAL",
        }
    }

    /// Internal errors are the only ones whose message is not safe to show.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
