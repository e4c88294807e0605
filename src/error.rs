use thiserror::Error;

/// Errors returned by a row store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to row store failed: {0}")]
    Transport(String),

    #[error("row store returned HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("column `{column}` does not exist")]
    MissingColumn { column: String },

    #[error("could not decode row store response: {0}")]
    Decode(String),

    #[error("row `{0}` was never stored")]
    Unresolved(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Transport failures and 5xx responses may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}

/// Errors surfaced by the auth subsystem
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Transport(String),

    #[error("{0}")]
    Rejected(String),

    #[error("email and password are required")]
    MissingCredentials,

    #[error("could not decode auth response: {0}")]
    Decode(String),

    #[error("could not persist session: {0}")]
    Persistence(String),

    #[error("sign-in is not configured; set DAYFLOW_STORE_URL and DAYFLOW_STORE_ANON_KEY or run with --offline")]
    NotConfigured,
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Transport(e.to_string())
    }
}

/// Reasons an analysis fell back to the canned result
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("transcript is empty")]
    EmptyTranscript,

    #[error("LLM API key is not configured")]
    MissingCredential,

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response had no message content")]
    EmptyChoice,

    #[error("LLM content is not valid JSON: {0}")]
    Parse(String),

    #[error("LLM content is missing required field `{0}`")]
    Schema(&'static str),
}
