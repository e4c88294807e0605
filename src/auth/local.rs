use super::{require_credentials, AuthBackend, Session, SessionFile, User};
use crate::error::AuthError;
use uuid::Uuid;

/// Offline auth: any non-empty credentials sign in as a stable local user
pub struct LocalAuthBackend {
    sessions: SessionFile,
}

impl LocalAuthBackend {
    pub fn new(sessions: SessionFile) -> Self {
        Self { sessions }
    }

    fn session_for(email: &str) -> Session {
        let email = email.trim().to_lowercase();
        Session {
            access_token: format!("local-{}", Uuid::new_v4()),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes()).to_string(),
                email: Some(email),
            },
        }
    }
}

impl AuthBackend for LocalAuthBackend {
    fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        require_credentials(email, password)?;
        let session = Self::session_for(email);
        self.sessions.save(&session)?;
        Ok(session)
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        self.sign_in(email, password).map(Some)
    }

    fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        self.sessions.clear()
    }

    fn current_session(&self) -> Result<Option<Session>, AuthError> {
        self.sessions.load()
    }
}
