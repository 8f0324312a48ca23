//! End-to-end lifecycle coverage through the public surface only:
//! restore a persisted session, watch the background refresh land,
//! hammer the store concurrently, and walk through sign-out.

use async_trait::async_trait;
use core_session::{
    AuthProvider, RefreshError, Session, SessionError, SessionEvent, SessionState, SessionStore,
    UserId,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "core_session=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Provider fake: in-memory persisted session, scripted refresh failures,
/// refreshes mint hour-long tokens with a serial number.
struct InMemoryProvider {
    persisted: Mutex<Option<Session>>,
    refresh_calls: AtomicUsize,
    failures: Mutex<VecDeque<RefreshError>>,
    delay: Duration,
    user_id: UserId,
}

impl InMemoryProvider {
    fn new(persisted: Option<Session>, user_id: UserId) -> Self {
        Self {
            persisted: Mutex::new(persisted),
            refresh_calls: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            user_id,
        }
    }

    fn queue_failure(&self, err: RefreshError) {
        self.failures.lock().unwrap().push_back(err);
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for InMemoryProvider {
    async fn get_session(&self) -> Result<Option<Session>, RefreshError> {
        Ok(self.persisted.lock().unwrap().clone())
    }

    async fn refresh_session(&self, current: &Session) -> Result<Session, RefreshError> {
        let serial = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Session::new(
            format!("token-v{serial}"),
            current.refresh_token.clone(),
            3600,
            self.user_id,
        ))
    }

    async fn sign_out(&self) -> Result<(), RefreshError> {
        *self.persisted.lock().unwrap() = None;
        Ok(())
    }
}

fn session_expiring_in(secs: i64, user_id: UserId) -> Session {
    Session::new(
        "persisted-token".to_string(),
        "persisted-refresh".to_string(),
        secs,
        user_id,
    )
}

fn record_events(store: &SessionStore) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn restored_stale_session_refreshes_in_background() {
    init_tracing();
    let user_id = UserId::new();
    let provider = Arc::new(InMemoryProvider::new(
        Some(session_expiring_in(60, user_id)),
        user_id,
    ));
    let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn AuthProvider>);
    let events = record_events(&store);

    store.init().await;
    assert!(store.is_authenticated().await);
    assert_eq!(store.current_user_id().await, Some(user_id));

    // init must not block on the refresh; its outcome shows up as an event.
    wait_until(|| {
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SessionEvent::Refreshed { .. }))
    })
    .await;

    assert_eq!(store.get_access_token().await.unwrap(), "token-v1");
    assert_eq!(provider.refresh_calls(), 1);
}

#[tokio::test]
async fn concurrent_consumers_coalesce_onto_one_refresh() {
    init_tracing();
    let user_id = UserId::new();
    let mut provider = InMemoryProvider::new(None, user_id);
    provider.delay = Duration::from_millis(50);
    let provider = Arc::new(provider);

    let store = Arc::new(SessionStore::new(
        Arc::clone(&provider) as Arc<dyn AuthProvider>
    ));
    store.sign_in(session_expiring_in(60, user_id)).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move { store.get_access_token().await }));
    }

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(provider.refresh_calls(), 1);
    assert!(tokens.iter().all(|t| t == "token-v1"));
}

#[tokio::test]
async fn full_lifecycle_sign_in_refresh_sign_out() {
    init_tracing();
    let user_id = UserId::new();
    let provider = Arc::new(InMemoryProvider::new(None, user_id));
    let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn AuthProvider>);
    let events = record_events(&store);

    assert_eq!(
        store.get_access_token().await,
        Err(SessionError::SessionMissing)
    );

    store.sign_in(session_expiring_in(60, user_id)).await;
    assert_eq!(store.get_access_token().await.unwrap(), "token-v1");

    store.sign_out().await;
    assert!(!store.is_authenticated().await);
    assert_eq!(store.state().await, SessionState::NoSession);
    assert_eq!(
        store.get_access_token().await,
        Err(SessionError::SessionMissing)
    );

    let events = events.lock().unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.description()).collect();
    assert_eq!(
        kinds,
        vec![
            "User signed in",
            "Access token refreshed",
            "User signed out"
        ]
    );
}

#[tokio::test]
async fn transient_failure_degrades_to_stale_token() {
    init_tracing();
    let user_id = UserId::new();
    let provider = Arc::new(InMemoryProvider::new(None, user_id));
    provider.queue_failure(RefreshError::Transient("dns failure".to_string()));
    let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn AuthProvider>);
    let events = record_events(&store);

    store.sign_in(session_expiring_in(60, user_id)).await;

    // Stale but unexpired: the old token is better than blocking the caller.
    assert_eq!(store.get_access_token().await.unwrap(), "persisted-token");
    assert!(!events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SessionEvent::SignedOut)));

    // Next attempt reaches the provider again and succeeds.
    assert_eq!(store.get_access_token().await.unwrap(), "token-v2");
    assert_eq!(provider.refresh_calls(), 2);
}

#[tokio::test]
async fn fatal_failure_forces_reauthentication() {
    init_tracing();
    let user_id = UserId::new();
    let provider = Arc::new(InMemoryProvider::new(None, user_id));
    provider.queue_failure(RefreshError::Fatal("refresh token revoked".to_string()));
    let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn AuthProvider>);
    let events = record_events(&store);

    store.sign_in(session_expiring_in(-10, user_id)).await;

    assert_eq!(
        store.get_access_token().await,
        Err(SessionError::SessionExpired)
    );
    assert_eq!(store.state().await, SessionState::Expired);

    let signed_out = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SessionEvent::SignedOut))
        .count();
    assert_eq!(signed_out, 1);

    // Acknowledging with sign_out is quiet; a new sign-in recovers.
    store.sign_out().await;
    assert_eq!(store.state().await, SessionState::NoSession);
    let signed_out = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SessionEvent::SignedOut))
        .count();
    assert_eq!(signed_out, 1);

    store.sign_in(session_expiring_in(3600, user_id)).await;
    assert_eq!(store.get_access_token().await.unwrap(), "persisted-token");
}

#[tokio::test]
async fn unsubscribe_silences_a_listener() {
    init_tracing();
    let user_id = UserId::new();
    let provider = Arc::new(InMemoryProvider::new(None, user_id));
    let store = SessionStore::new(provider as Arc<dyn AuthProvider>);

    let count = Arc::new(AtomicUsize::new(0));
    let handle = {
        let count = Arc::clone(&count);
        store.subscribe(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };

    store.sign_in(session_expiring_in(3600, user_id)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    assert!(store.unsubscribe(handle));
    store.sign_out().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
