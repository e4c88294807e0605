use super::{require_credentials, AuthBackend, Session, SessionFile, User};
use crate::config::PLACEHOLDER_STORE_URL;
use crate::error::AuthError;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Refresh sessions this close to expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        Session {
            expires_at: self
                .expires_at
                .or_else(|| self.expires_in.map(|secs| now + secs)),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
        }
    }
}

/// Auth subsystem of the hosted backend (GoTrue REST dialect)
pub struct GoTrueBackend {
    base_url: String,
    anon_key: String,
    client: Client,
    sessions: SessionFile,
}

impl GoTrueBackend {
    pub fn new(base_url: &str, anon_key: &str, sessions: SessionFile) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: Client::new(),
            sessions,
        }
    }

    /// False while the store URL or anon key is still the placeholder
    fn is_configured(&self) -> bool {
        self.base_url != PLACEHOLDER_STORE_URL && !self.anon_key.trim().is_empty()
    }

    fn require_configured(&self) -> Result<(), AuthError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(AuthError::NotConfigured)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn with_key(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header("Accept", "application/json")
    }

    fn post_json(&self, path: &str, body: Value) -> Result<(u16, String), AuthError> {
        let url = self.url(path);
        debug!(url = %url, "auth request");
        let resp = self
            .with_key(self.client.post(&url))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()?;
        let status = resp.status().as_u16();
        Ok((status, resp.text().unwrap_or_default()))
    }

    fn token_grant(&self, grant: &str, body: Value) -> Result<Session, AuthError> {
        let (status, text) = self.post_json(&format!("token?grant_type={}", grant), body)?;
        if !(200..300).contains(&status) {
            return Err(AuthError::Rejected(error_message(status, &text)));
        }
        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|e| AuthError::Decode(e.to_string()))?;
        let session = parsed.into_session(now());
        self.sessions.save(&session)?;
        Ok(session)
    }

    fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        info!("refreshing expired session");
        self.token_grant("refresh_token", json!({"refresh_token": refresh_token}))
    }

    fn validate(&self, session: &Session) -> Result<bool, AuthError> {
        let resp = self
            .with_key(self.client.get(self.url("user")))
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()?;
        let status = resp.status().as_u16();
        match status {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            _ => Err(AuthError::Rejected(error_message(
                status,
                &resp.text().unwrap_or_default(),
            ))),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Pick the human-readable message out of an auth error body
pub(crate) fn error_message(status: u16, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("auth request failed with HTTP {}", status))
}

impl AuthBackend for GoTrueBackend {
    fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        require_credentials(email, password)?;
        self.require_configured()?;
        let session = self.token_grant(
            "password",
            json!({"email": email.trim(), "password": password}),
        )?;
        info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        require_credentials(email, password)?;
        self.require_configured()?;
        let (status, text) =
            self.post_json("signup", json!({"email": email.trim(), "password": password}))?;
        if !(200..300).contains(&status) {
            return Err(AuthError::Rejected(error_message(status, &text)));
        }
        // Projects with email confirmation answer with the bare user
        match serde_json::from_str::<TokenResponse>(&text) {
            Ok(parsed) => {
                let session = parsed.into_session(now());
                self.sessions.save(&session)?;
                Ok(Some(session))
            }
            Err(_) => {
                info!("sign-up awaiting email confirmation");
                Ok(None)
            }
        }
    }

    fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        self.sessions.clear()?;
        if !self.is_configured() {
            return Ok(());
        }
        let resp = self
            .with_key(self.client.post(self.url("logout")))
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()?;
        let status = resp.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(AuthError::Rejected(error_message(
                status,
                &resp.text().unwrap_or_default(),
            )))
        }
    }

    fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.sessions.load()? else {
            return Ok(None);
        };
        self.require_configured()?;
        if session.is_expired(now(), EXPIRY_MARGIN_SECS) {
            return match session.refresh_token.as_deref() {
                Some(token) => self.refresh(token).map(Some),
                None => {
                    self.sessions.clear()?;
                    Ok(None)
                }
            };
        }
        if self.validate(&session)? {
            Ok(Some(session))
        } else {
            warn!("stored session rejected, signing out locally");
            self.sessions.clear()?;
            Ok(None)
        }
    }
}
