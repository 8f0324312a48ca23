//! Lifecycle event fan-out.
//!
//! Dependent consumers (UI components, API relays) register listeners and
//! receive lifecycle transitions in subscription order. A failing listener
//! is isolated: its panic is caught and reported without interrupting
//! delivery to the remaining listeners or propagating to the publisher.
//!
//! Events are published only after the store's mutation is fully
//! committed, so listeners never observe a partially-mutated session.
//!
//! ## Usage
//!
//! ```
//! use core_session::{EventBroadcaster, SessionEvent};
//!
//! let broadcaster = EventBroadcaster::new();
//! let handle = broadcaster.subscribe(|event| {
//!     if matches!(event, SessionEvent::SignedOut) {
//!         println!("signed out, back to the login screen");
//!     }
//! });
//!
//! broadcaster.publish(&SessionEvent::SignedOut);
//! broadcaster.unsubscribe(handle);
//! ```

use crate::types::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::error;

/// A session lifecycle transition, immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// An external sign-in delivered a fresh session.
    SignedIn {
        /// The newly established session.
        session: Session,
    },
    /// The session was destroyed, either explicitly or by a fatal refresh
    /// failure.
    SignedOut,
    /// The access token was replaced by a successful refresh.
    Refreshed {
        /// The session after the refresh was committed.
        session: Session,
    },
}

impl SessionEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            SessionEvent::SignedIn { .. } => "User signed in",
            SessionEvent::SignedOut => "User signed out",
            SessionEvent::Refreshed { .. } => "Access token refreshed",
        }
    }
}

/// Stable handle returned by [`EventBroadcaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = std::sync::Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Ordered listener registry for session lifecycle events.
///
/// Listeners are invoked synchronously, in subscription order, on the
/// publisher's task. Unsubscribing through the returned handle is stable
/// under concurrent subscribe/unsubscribe from other listeners.
pub struct EventBroadcaster {
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    /// Creates an empty broadcaster.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a listener and returns its unsubscribe handle.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners()
            .push((id, std::sync::Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if the handle was already
    /// unsubscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers an event to every registered listener in subscription
    /// order.
    ///
    /// A panicking listener is reported via `tracing` and skipped; it
    /// neither blocks later listeners nor reaches the publisher.
    pub fn publish(&self, event: &SessionEvent) {
        // Snapshot so listeners may subscribe/unsubscribe re-entrantly.
        let snapshot: Vec<(SubscriptionId, Listener)> = self.lock_listeners().clone();
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(
                    subscription = id.0,
                    event = event.description(),
                    "session event listener panicked, continuing with remaining listeners"
                );
            }
        }
    }

    /// Returns the number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.lock_listeners().len()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        // A listener panic is caught before it can poison the lock, but
        // recover anyway rather than propagating a poison panic.
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
