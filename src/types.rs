use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for the user that owns a session.
///
/// The identifier is opaque to this crate; it is whatever the auth
/// provider issued at sign-in time.
///
/// # Examples
///
/// ```
/// use core_session::UserId;
///
/// let user_id = UserId::new();
/// let parsed = UserId::from_string("550e8400-e29b-41d4-a716-446655440000").unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Create a new random user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a user ID from its string representation
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A bearer credential plus its expiry and owner identity.
///
/// At most one session is active per [`SessionStore`](crate::SessionStore)
/// at any time; consumers only ever observe a fully valid session or none
/// at all.
///
/// # Security
///
/// Token values are never logged. The `Debug` implementation redacts both
/// token fields.
///
/// # Examples
///
/// ```
/// use core_session::{Session, UserId};
///
/// let session = Session::new(
///     "access_token".to_string(),
///     "refresh_token".to_string(),
///     3600, // expires in 1 hour
///     UserId::new(),
/// );
/// assert!(session.time_until_expiry().is_some());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The access token attached to outbound API calls
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: String,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
    /// The authenticated user this session belongs to
    pub user_id: UserId,
}

impl Session {
    /// Create a session expiring `expires_in` seconds from now
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        user_id: UserId,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
            user_id,
        }
    }

    /// Time remaining until expiry, or `None` if already expired
    pub fn time_until_expiry(&self) -> Option<chrono::Duration> {
        let now = Utc::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Lifecycle state of the session slot.
///
/// # State Transitions
///
/// ```text
/// NoSession -> Valid        (external sign-in)
/// Valid     -> Refreshing   (staleness detected, first caller only)
/// Refreshing-> Valid        (refresh success or transient fallback)
/// Refreshing-> Expired      (fatal refresh failure)
/// Valid     -> Expired      (expiry crossed with no successful refresh)
/// Expired   -> NoSession    (explicit sign-out / acknowledgment)
/// Valid     -> NoSession    (explicit sign-out)
/// ```
///
/// `NoSession` and `Expired` are terminal until a new external sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    /// No session has been established
    #[default]
    NoSession,
    /// A session is present and usable
    Valid,
    /// A refresh is in flight
    Refreshing,
    /// The session was invalidated and a new sign-in is required
    Expired,
}

impl SessionState {
    /// Check whether a usable session is present.
    ///
    /// Returns `true` for `Valid` and `Refreshing` states.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Valid | SessionState::Refreshing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::NoSession => write!(f, "No Session"),
            SessionState::Valid => write!(f, "Valid"),
            SessionState::Refreshing => write!(f, "Refreshing..."),
            SessionState::Expired => write!(f, "Expired"),
        }
    }
}
