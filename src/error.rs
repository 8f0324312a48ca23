use thiserror::Error;

/// Errors surfaced to consumers of the session store.
///
/// `Clone` is derived so that a single in-flight refresh outcome can be
/// fanned out to every coalesced caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session has ever been established. The caller must sign in.
    #[error("no active session, sign-in required")]
    SessionMissing,

    /// The session is gone for good: the refresh token was rejected, or the
    /// access token expired with no viable fallback. Re-authentication is
    /// required.
    #[error("session expired, re-authentication required")]
    SessionExpired,

    /// A refresh attempt failed for reasons unrelated to credential
    /// validity. Normally absorbed by falling back to the still-valid
    /// access token; only observable when no fallback exists.
    #[error("transient refresh failure: {0}")]
    RefreshTransient(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
