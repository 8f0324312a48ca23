//! # Session Lifecycle Core
//!
//! Client-side session and bearer token lifecycle management.
//!
//! ## Overview
//!
//! This crate keeps a single bearer credential usable across an
//! application's running lifetime. It proactively refreshes the access
//! token before expiry, coalesces concurrent refresh attempts into one
//! provider call, broadcasts lifecycle transitions to dependent
//! consumers, and degrades gracefully when a refresh fails.
//!
//! ## Features
//!
//! - Proactive refresh ahead of expiry (configurable threshold)
//! - Single-flight coalescing of concurrent refresh attempts
//! - Ordered lifecycle event fan-out with listener failure isolation
//! - Typed fatal/transient failure policy with stale-token fallback
//! - Pluggable [`AuthProvider`] collaborator for the actual credential
//!   operations and persistence
//!
//! ## Usage
//!
//! ```no_run
//! use core_session::{AuthProvider, SessionEvent, SessionStore};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn AuthProvider>) -> core_session::Result<()> {
//! let store = SessionStore::new(provider);
//! store.init().await;
//!
//! let handle = store.subscribe(|event| {
//!     if matches!(event, SessionEvent::SignedOut) {
//!         // force the user back to the login screen
//!     }
//! });
//!
//! let token = store.get_access_token().await?;
//! // attach `token` to outbound API calls...
//!
//! store.unsubscribe(handle);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod guard;
pub mod provider;
mod refresh;
pub mod store;
pub mod types;

pub use error::{Result, SessionError};
pub use events::{EventBroadcaster, SessionEvent, SubscriptionId};
pub use guard::{Freshness, DEFAULT_REFRESH_THRESHOLD};
pub use provider::{AuthProvider, RefreshError};
pub use store::SessionStore;
pub use types::{Session, SessionState, UserId};
