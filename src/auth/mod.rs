pub mod gotrue;
pub mod local;
pub mod state;

pub use gotrue::GoTrueBackend;
pub use local::LocalAuthBackend;
pub use state::{AuthEvent, AuthStore};

use crate::error::AuthError;
use crate::persistence::{atomic_write, read_file, remove_file};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    /// Expired, or expiring within `margin_secs` of `now`
    pub fn is_expired(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now + margin_secs)
    }
}

/// The remote auth subsystem
pub trait AuthBackend: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Returns a session when the account is usable immediately, `None`
    /// when it awaits confirmation
    fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError>;

    fn sign_out(&self, session: &Session) -> Result<(), AuthError>;

    /// The session restored from the previous run, if still valid
    fn current_session(&self) -> Result<Option<Session>, AuthError>;
}

/// Session persisted between runs
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Option<Session>, AuthError> {
        let content = read_file(&self.path).map_err(|e| AuthError::Persistence(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| AuthError::Persistence(e.to_string()))
    }

    pub fn save(&self, session: &Session) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| AuthError::Persistence(e.to_string()))?;
        atomic_write(&self.path, &json).map_err(|e| AuthError::Persistence(e.to_string()))
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        remove_file(&self.path).map_err(|e| AuthError::Persistence(e.to_string()))
    }
}

pub(crate) fn require_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        Err(AuthError::MissingCredentials)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn session(id: &str) -> Session {
        Session {
            access_token: format!("token-{}", id),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(2_000),
            user: User {
                id: id.to_string(),
                email: Some(format!("{}@example.com", id)),
            },
        }
    }

    #[test]
    fn test_session_expiry() {
        let s = session("u");
        assert!(!s.is_expired(1_000, 60));
        assert!(s.is_expired(1_950, 60));
        let open = Session {
            expires_at: None,
            ..s
        };
        assert!(!open.is_expired(i64::MAX - 100, 60));
    }

    #[test]
    fn test_session_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(dir.path().join("session.json"));
        assert_eq!(file.load().unwrap(), None);

        file.save(&session("u1")).unwrap();
        assert_eq!(file.load().unwrap(), Some(session("u1")));

        file.clear().unwrap();
        assert_eq!(file.load().unwrap(), None);
    }

    #[test]
    fn test_require_credentials() {
        assert!(require_credentials("a@b.c", "pw").is_ok());
        assert!(matches!(
            require_credentials(" ", "pw"),
            Err(AuthError::MissingCredentials)
        ));
        assert!(require_credentials("a@b.c", "").is_err());
    }
}
