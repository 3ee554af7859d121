use crate::transport::TransportError;
use crate::types::{Region, UserId};

/// Client-facing message for every failed login.
pub const AUTHENTICATION_FAILED: &str = "authentication failed";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A transport failure that the retry policy does not cover.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every attempt allowed by the retry policy failed.
    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Upstream answered, but not with a status the operation can use.
    #[error("{operation}: unexpected status {status}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
    },

    /// Upstream answered with a body the operation could not interpret.
    #[error("{operation}: malformed response: {detail}")]
    Decode {
        operation: &'static str,
        detail: String,
    },

    #[error("authorization init failed: {0}")]
    InitFailed(#[source] Box<Error>),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("access token extraction failed: {0}")]
    TokenExtractionFailed(String),

    #[error("no recognized session cookies provided")]
    NoCookiesProvided,

    #[error("cookie authentication failed: {0}")]
    CookieAuthFailed(String),

    /// No shard answered the region probe. Callers degrade to `fallback`.
    #[error("region could not be determined, using {fallback}")]
    RegionUndetermined { fallback: Region },

    #[error("unknown region: {0}")]
    InvalidRegion(String),

    #[error("session not found for user {0}")]
    SessionNotFound(UserId),

    #[error("token invalid: {0}")]
    TokenInvalid(String),

    #[error("token expired")]
    TokenExpired,

    #[error("authentication timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// True for errors produced by a failed login attempt.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Exhausted { .. }
                | Self::UnexpectedStatus { .. }
                | Self::Decode { .. }
                | Self::InitFailed(_)
                | Self::InvalidCredentials
                | Self::TokenExtractionFailed(_)
                | Self::NoCookiesProvided
                | Self::CookieAuthFailed(_)
                | Self::Timeout
        )
    }

    /// Message safe to hand to an end user.
    ///
    /// Login failures collapse into [`AUTHENTICATION_FAILED`]; upstream wire
    /// detail stays in the `Display` output for logs only.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            e if e.is_authentication_failure() => AUTHENTICATION_FAILED,
            Self::SessionNotFound(_) => "session expired, please log in again",
            Self::TokenInvalid(_) | Self::TokenExpired => "token invalid or expired",
            Self::InvalidRegion(_) => "unsupported region",
            _ => "internal error",
        }
    }
}
