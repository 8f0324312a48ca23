//! Single-flight refresh execution and failure policy.
//!
//! The coordinator is the only writer of the session slot. Concurrent
//! callers observing the same stale session are coalesced onto one
//! outstanding provider call; every coalesced caller resolves from that
//! call's outcome. Failures are dispatched once through a single policy:
//! a fatal failure destroys the session, a transient failure falls back to
//! the still-unexpired access token when one exists and escalates to a
//! hard expiry otherwise.

use crate::error::{Result, SessionError};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::guard::Freshness;
use crate::provider::{AuthProvider, RefreshError};
use crate::types::{Session, SessionState};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// The session slot: record, lifecycle state, and a destruction epoch.
///
/// The epoch is bumped whenever the session identity changes (sign-in,
/// sign-out, fatal invalidation) so that a refresh outcome landing after
/// the session it started from was destroyed is discarded instead of
/// resurrecting it.
pub(crate) struct SessionCell {
    pub(crate) session: Option<Session>,
    pub(crate) state: SessionState,
    pub(crate) epoch: u64,
}

impl SessionCell {
    pub(crate) fn new() -> Self {
        Self {
            session: None,
            state: SessionState::NoSession,
            epoch: 0,
        }
    }
}

type RefreshOutcome = Option<Result<Session>>;

/// Executes refreshes against the auth provider with single-flight
/// semantics and applies the fallback/failure policy.
pub(crate) struct RefreshCoordinator {
    provider: Arc<dyn AuthProvider>,
    cell: Arc<RwLock<SessionCell>>,
    broadcaster: Arc<EventBroadcaster>,
    threshold_secs: i64,
    /// Receiver for the outcome of the refresh currently in flight, if any.
    in_flight: Mutex<Option<watch::Receiver<RefreshOutcome>>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        provider: Arc<dyn AuthProvider>,
        cell: Arc<RwLock<SessionCell>>,
        broadcaster: Arc<EventBroadcaster>,
        threshold_secs: i64,
    ) -> Self {
        Self {
            provider,
            cell,
            broadcaster,
            threshold_secs,
            in_flight: Mutex::new(None),
        }
    }

    /// Resolves to a session whose access token is usable right now.
    ///
    /// Suspends only when a refresh is required, and then only at the
    /// provider I/O boundary.
    pub(crate) async fn ensure_fresh(&self) -> Result<Session> {
        loop {
            // Fast path: no I/O when the current token is fresh.
            {
                let cell = self.cell.read().await;
                match &cell.session {
                    None => return Err(Self::absent_error(cell.state)),
                    Some(session) => {
                        if Freshness::of_session(session, Utc::now(), self.threshold_secs)
                            == Freshness::Fresh
                        {
                            return Ok(session.clone());
                        }
                    }
                }
            }

            // Single-flight gate: join the in-flight refresh or lead one.
            let mut in_flight = self.in_flight.lock().await;
            let mut rx = if let Some(rx) = in_flight.as_ref() {
                let rx = rx.clone();
                drop(in_flight);
                rx
            } else {
                let (tx, rx) = watch::channel(None);
                *in_flight = Some(rx);
                drop(in_flight);

                let outcome = self.run_refresh().await;
                let _ = tx.send(Some(outcome.clone()));
                *self.in_flight.lock().await = None;
                return outcome;
            };

            let outcome = rx
                .wait_for(|outcome| outcome.is_some())
                .await
                .map(|guard| guard.clone());
            match outcome {
                Ok(outcome) => {
                    if let Some(result) = outcome {
                        return result;
                    }
                }
                Err(_) => {
                    // The leader was dropped before publishing an outcome.
                    // Clear the dead slot so the next iteration can lead.
                    let mut in_flight = self.in_flight.lock().await;
                    if in_flight
                        .as_ref()
                        .map(|current| current.same_channel(&rx))
                        .unwrap_or(false)
                    {
                        *in_flight = None;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn run_refresh(&self) -> Result<Session> {
        // Claim the session for refreshing, re-checking freshness now that
        // we hold leadership: a flight that completed between our staleness
        // check and the gate may already have replaced the token.
        let (stale_session, epoch) = {
            let mut cell = self.cell.write().await;
            let session = match &cell.session {
                Some(session) => session.clone(),
                None => return Err(Self::absent_error(cell.state)),
            };
            if Freshness::of_session(&session, Utc::now(), self.threshold_secs) == Freshness::Fresh
            {
                return Ok(session);
            }
            cell.state = SessionState::Refreshing;
            (session, cell.epoch)
        };

        info!("access token stale, refreshing");
        let refreshed = self.provider.refresh_session(&stale_session).await;
        let now = Utc::now();

        let mut cell = self.cell.write().await;
        if cell.epoch != epoch {
            debug!("discarding refresh outcome, session was destroyed mid-flight");
            return Err(Self::absent_error(cell.state));
        }

        match refreshed {
            Ok(new_session) => {
                cell.session = Some(new_session.clone());
                cell.state = SessionState::Valid;
                drop(cell);
                self.broadcaster.publish(&SessionEvent::Refreshed {
                    session: new_session.clone(),
                });
                info!("access token refreshed");
                Ok(new_session)
            }
            Err(RefreshError::Transient(reason))
                if !Freshness::of_session(&stale_session, now, self.threshold_secs)
                    .is_expired() =>
            {
                warn!(%reason, "transient refresh failure, reusing current access token");
                cell.state = SessionState::Valid;
                Ok(stale_session)
            }
            Err(err) => {
                // Fatal failure, or a transient one with the old token
                // already past expiry.
                warn!(%err, "refresh failed with no usable fallback, destroying session");
                cell.session = None;
                cell.state = SessionState::Expired;
                cell.epoch += 1;
                drop(cell);
                self.broadcaster.publish(&SessionEvent::SignedOut);
                Err(SessionError::SessionExpired)
            }
        }
    }

    fn absent_error(state: SessionState) -> SessionError {
        match state {
            SessionState::Expired => SessionError::SessionExpired,
            _ => SessionError::SessionMissing,
        }
    }
}
