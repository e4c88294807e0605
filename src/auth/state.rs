use super::{AuthBackend, Session, User};
use crate::error::AuthError;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Session-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
    /// The initial session fetch did not answer within the bound
    InitialTimeout,
}

type SessionResult = Result<Option<Session>, AuthError>;

/// Mirrors the remote session for the rest of the app
pub struct AuthStore {
    backend: Arc<dyn AuthBackend>,
    session: Option<Session>,
    loading: bool,
    listeners: Vec<Sender<AuthEvent>>,
    pending: Option<Receiver<SessionResult>>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            backend,
            session: None,
            loading: true,
            listeners: Vec::new(),
            pending: None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Receive every subsequent session change
    pub fn subscribe(&mut self) -> Receiver<AuthEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    /// Restore the previous session, waiting at most `wait` for it.
    ///
    /// The fetch runs on a worker thread. If it misses the bound the app
    /// proceeds signed out and a late answer is applied by `poll`.
    pub fn initialize(&mut self, wait: Duration) {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        thread::spawn(move || {
            let _ = tx.send(backend.current_session());
        });

        match rx.recv_timeout(wait) {
            Ok(result) => self.finish_fetch(result),
            Err(RecvTimeoutError::Timeout) => {
                warn!(wait_ms = wait.as_millis() as u64, "session fetch timed out, continuing signed out");
                self.loading = false;
                self.pending = Some(rx);
                self.emit(AuthEvent::InitialTimeout);
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("session fetch worker exited without an answer");
                self.loading = false;
            }
        }
    }

    /// Apply a session fetch that finished after the initial bound
    pub fn poll(&mut self) {
        let Some(rx) = &self.pending else {
            return;
        };
        match rx.try_recv() {
            Ok(result) => {
                self.pending = None;
                // The user may have signed in meanwhile; that wins
                if self.session.is_none() {
                    self.finish_fetch(result);
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.pending = None,
        }
    }

    fn finish_fetch(&mut self, result: SessionResult) {
        self.loading = false;
        match result {
            Ok(Some(session)) => {
                info!(user = %session.user.id, "restored session");
                self.set_session(Some(session));
            }
            Ok(None) => info!("no stored session"),
            Err(e) => warn!(error = %e, "could not restore session"),
        }
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<User, AuthError> {
        let session = self.backend.sign_in(email, password)?;
        let user = session.user.clone();
        self.pending = None;
        self.set_session(Some(session));
        Ok(user)
    }

    /// Returns the user when the new account is signed in immediately
    pub fn sign_up(&mut self, email: &str, password: &str) -> Result<Option<User>, AuthError> {
        let session = self.backend.sign_up(email, password)?;
        let user = session.as_ref().map(|s| s.user.clone());
        if session.is_some() {
            self.pending = None;
            self.set_session(session);
        }
        Ok(user)
    }

    /// Clears local state even when the remote call fails; the error is
    /// still returned to the caller
    pub fn sign_out(&mut self) -> Result<(), AuthError> {
        let Some(session) = self.session.clone() else {
            return Ok(());
        };
        let result = self.backend.sign_out(&session);
        self.set_session(None);
        result
    }

    fn set_session(&mut self, session: Option<Session>) {
        let event = match &session {
            Some(s) => AuthEvent::SignedIn(s.user.clone()),
            None => AuthEvent::SignedOut,
        };
        self.session = session;
        self.emit(event);
    }

    fn emit(&mut self, event: AuthEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::session;
    use std::sync::Mutex;
    use std::time::Instant;

    struct FakeBackend {
        stored: Mutex<Option<Session>>,
        delay: Duration,
        reject_sign_in: bool,
    }

    impl FakeBackend {
        fn new(stored: Option<Session>, delay: Duration) -> Self {
            Self {
                stored: Mutex::new(stored),
                delay,
                reject_sign_in: false,
            }
        }
    }

    impl AuthBackend for FakeBackend {
        fn sign_in(&self, email: &str, _password: &str) -> Result<Session, AuthError> {
            if self.reject_sign_in {
                return Err(AuthError::Rejected("Invalid login credentials".into()));
            }
            Ok(session(email))
        }

        fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<Session>, AuthError> {
            Ok(None)
        }

        fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
            Err(AuthError::Transport("offline".into()))
        }

        fn current_session(&self) -> Result<Option<Session>, AuthError> {
            thread::sleep(self.delay);
            Ok(self.stored.lock().unwrap().clone())
        }
    }

    #[test]
    fn test_initialize_restores_session() {
        let backend = Arc::new(FakeBackend::new(Some(session("u1")), Duration::ZERO));
        let mut auth = AuthStore::new(backend);
        let events = auth.subscribe();
        assert!(auth.is_loading());

        auth.initialize(Duration::from_secs(2));
        assert!(!auth.is_loading());
        assert_eq!(auth.user().map(|u| u.id.as_str()), Some("u1"));
        assert_eq!(events.try_recv().unwrap(), AuthEvent::SignedIn(session("u1").user));
    }

    #[test]
    fn test_initialize_is_bounded() {
        let backend = Arc::new(FakeBackend::new(
            Some(session("late")),
            Duration::from_millis(300),
        ));
        let mut auth = AuthStore::new(backend);
        let events = auth.subscribe();

        let started = Instant::now();
        auth.initialize(Duration::from_millis(20));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(!auth.is_loading());
        assert!(auth.user().is_none());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::InitialTimeout);

        // The late answer is still applied once it arrives
        thread::sleep(Duration::from_millis(400));
        auth.poll();
        assert_eq!(auth.user().map(|u| u.id.as_str()), Some("late"));
        assert_eq!(
            events.try_recv().unwrap(),
            AuthEvent::SignedIn(session("late").user)
        );
    }

    #[test]
    fn test_sign_in_errors_surface() {
        let mut backend = FakeBackend::new(None, Duration::ZERO);
        backend.reject_sign_in = true;
        let mut auth = AuthStore::new(Arc::new(backend));
        auth.initialize(Duration::from_secs(1));

        let err = auth.sign_in("a@b.c", "wrong").unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(auth.user().is_none());
    }

    #[test]
    fn test_sign_out_clears_state_and_reports_error() {
        let backend = Arc::new(FakeBackend::new(None, Duration::ZERO));
        let mut auth = AuthStore::new(backend);
        auth.initialize(Duration::from_secs(1));
        auth.sign_in("me", "pw").unwrap();
        let events = auth.subscribe();

        assert!(auth.sign_out().is_err());
        assert!(auth.user().is_none());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::SignedOut);
    }

    #[test]
    fn test_sign_up_awaiting_confirmation() {
        let backend = Arc::new(FakeBackend::new(None, Duration::ZERO));
        let mut auth = AuthStore::new(backend);
        assert_eq!(auth.sign_up("a@b.c", "pw").unwrap(), None);
        assert!(auth.user().is_none());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let backend = Arc::new(FakeBackend::new(None, Duration::ZERO));
        let mut auth = AuthStore::new(backend);
        drop(auth.subscribe());
        let live = auth.subscribe();
        auth.sign_in("x", "pw").unwrap();
        assert_eq!(auth.listeners.len(), 1);
        assert!(live.try_recv().is_ok());
    }
}
