//! Session store facade.
//!
//! Owns the process's single session record and exposes the public
//! surface consumers use: `init`, `get_access_token`, `sign_out`, the
//! read accessors, and the lifecycle subscription API. All writes to the
//! session go through the store or its refresh coordinator; everything
//! else reads through the accessors.
//!
//! ## Usage
//!
//! ```no_run
//! use core_session::{AuthProvider, SessionStore};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn AuthProvider>) -> core_session::Result<()> {
//! let store = SessionStore::new(provider);
//! store.init().await;
//!
//! let token = store.get_access_token().await?;
//! // attach `token` to an outbound API call...
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::events::{EventBroadcaster, SessionEvent, SubscriptionId};
use crate::guard::{Freshness, DEFAULT_REFRESH_THRESHOLD};
use crate::provider::AuthProvider;
use crate::refresh::{RefreshCoordinator, SessionCell};
use crate::types::{Session, SessionState, UserId};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Holds the current session and keeps its access token usable.
///
/// Construct one instance per process (or per test) and share it by
/// reference; there is no ambient global. The store proactively refreshes
/// the token before expiry, coalesces concurrent refresh attempts into a
/// single provider call, and broadcasts lifecycle transitions to
/// registered listeners.
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    cell: Arc<RwLock<SessionCell>>,
    broadcaster: Arc<EventBroadcaster>,
    coordinator: Arc<RefreshCoordinator>,
    threshold_secs: i64,
    initialized: AtomicBool,
}

impl SessionStore {
    /// Creates a store with the default refresh threshold.
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self::with_threshold(provider, DEFAULT_REFRESH_THRESHOLD)
    }

    /// Creates a store that refreshes tokens `threshold` ahead of expiry.
    pub fn with_threshold(provider: Arc<dyn AuthProvider>, threshold: Duration) -> Self {
        let threshold_secs = threshold.as_secs() as i64;
        let cell = Arc::new(RwLock::new(SessionCell::new()));
        let broadcaster = Arc::new(EventBroadcaster::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&provider),
            Arc::clone(&cell),
            Arc::clone(&broadcaster),
            threshold_secs,
        ));
        Self {
            provider,
            cell,
            broadcaster,
            coordinator,
            threshold_secs,
            initialized: AtomicBool::new(false),
        }
    }

    /// Loads a persisted session from the provider.
    ///
    /// Runs the load exactly once; repeated calls are no-ops. If the
    /// loaded session is already stale, one refresh attempt is started in
    /// the background without blocking the caller; its outcome is only
    /// observable through later [`get_access_token`](Self::get_access_token)
    /// calls and broadcast events. A failed load is logged and leaves the
    /// store without a session.
    #[instrument(skip(self))]
    pub async fn init(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("session store already initialized");
            return;
        }

        match self.provider.get_session().await {
            Ok(Some(session)) => {
                let stale = Freshness::of_session(&session, Utc::now(), self.threshold_secs)
                    .is_stale();
                {
                    let mut cell = self.cell.write().await;
                    cell.session = Some(session);
                    cell.state = SessionState::Valid;
                    cell.epoch += 1;
                }
                info!("persisted session restored");

                if stale {
                    debug!("restored session is stale, refreshing in the background");
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        if let Err(err) = coordinator.ensure_fresh().await {
                            warn!(%err, "initialization refresh failed");
                        }
                    });
                }
            }
            Ok(None) => debug!("no persisted session"),
            Err(err) => warn!(%err, "failed to load persisted session"),
        }
    }

    /// Returns an access token that is valid right now, refreshing first
    /// if the current one is stale.
    ///
    /// This is the sole entry point consumers use to obtain credentials.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionMissing`](crate::SessionError::SessionMissing)
    ///   if no session has been established
    /// - [`SessionError::SessionExpired`](crate::SessionError::SessionExpired)
    ///   if the session could not be refreshed and no fallback exists
    #[instrument(skip(self))]
    pub async fn get_access_token(&self) -> Result<String> {
        let session = self.coordinator.ensure_fresh().await?;
        Ok(session.access_token)
    }

    /// Installs a fresh session delivered by an external sign-in event.
    ///
    /// Replaces any previous session and publishes
    /// [`SessionEvent::SignedIn`] once the new record is committed.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn sign_in(&self, session: Session) {
        {
            let mut cell = self.cell.write().await;
            cell.session = Some(session.clone());
            cell.state = SessionState::Valid;
            cell.epoch += 1;
        }
        self.broadcaster.publish(&SessionEvent::SignedIn { session });
        info!("session established");
    }

    /// Destroys the current session.
    ///
    /// Revocation is attempted on the provider but the local session is
    /// destroyed regardless of its outcome. Publishes
    /// [`SessionEvent::SignedOut`] when a session was actually present;
    /// idempotent otherwise (including after a fatal refresh failure
    /// already announced the sign-out).
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let had_session = {
            let mut cell = self.cell.write().await;
            let had = cell.session.take().is_some();
            cell.state = SessionState::NoSession;
            cell.epoch += 1;
            had
        };

        if !had_session {
            debug!("sign-out with no active session");
            return;
        }

        if let Err(err) = self.provider.sign_out().await {
            warn!(%err, "provider sign-out failed, local session destroyed anyway");
        }
        self.broadcaster.publish(&SessionEvent::SignedOut);
        info!("signed out");
    }

    /// Whether a usable session is currently present.
    pub async fn is_authenticated(&self) -> bool {
        self.cell.read().await.state.is_authenticated()
    }

    /// The owner of the current session, if one exists.
    pub async fn current_user_id(&self) -> Option<UserId> {
        self.cell.read().await.session.as_ref().map(|s| s.user_id)
    }

    /// A snapshot of the current session, if one exists.
    pub async fn current_session(&self) -> Option<Session> {
        self.cell.read().await.session.clone()
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.cell.read().await.state
    }

    /// Registers a lifecycle event listener.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(listener)
    }

    /// Removes a previously registered listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.broadcaster.unsubscribe(id)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("threshold_secs", &self.threshold_secs)
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish()
    }
}
