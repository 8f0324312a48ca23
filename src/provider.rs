//! Abstract auth provider collaborator.
//!
//! The provider owns the initial credential-issuance handshake and any
//! persistence of the session record; this crate only drives its refresh
//! and revocation operations. Refresh failures carry a fatal/transient
//! classification that the refresh policy dispatches on.

use crate::types::Session;
use async_trait::async_trait;
use thiserror::Error;

/// Classified failure reported by an [`AuthProvider`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The refresh credential itself was rejected. The session cannot be
    /// recovered and must be destroyed.
    #[error("refresh credential rejected: {0}")]
    Fatal(String),

    /// A network or provider error unrelated to credential validity.
    /// The existing token may still be usable.
    #[error("provider temporarily unavailable: {0}")]
    Transient(String),
}

impl RefreshError {
    /// Whether this failure invalidates the session outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RefreshError::Fatal(_))
    }
}

/// External collaborator performing the actual credential operations.
///
/// Implementations are expected to be cheap to share (`Arc<dyn
/// AuthProvider>`) and safe to call from concurrent tasks; the session
/// store guarantees at most one outstanding `refresh_session` call at a
/// time regardless of caller concurrency.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Load a previously persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>, RefreshError>;

    /// Exchange the session's refresh token for a new access token.
    ///
    /// On success the returned session carries the new access token and
    /// expiry, and possibly a rotated refresh token.
    async fn refresh_session(&self, current: &Session) -> Result<Session, RefreshError>;

    /// Revoke the session on the provider side.
    async fn sign_out(&self) -> Result<(), RefreshError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_error_classification() {
        assert!(RefreshError::Fatal("invalid refresh token".to_string()).is_fatal());
        assert!(!RefreshError::Transient("connection reset".to_string()).is_fatal());
    }

    #[test]
    fn test_refresh_error_display() {
        let err = RefreshError::Transient("timeout".to_string());
        assert_eq!(err.to_string(), "provider temporarily unavailable: timeout");
    }
}
