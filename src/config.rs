use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Substituted when no store endpoint is configured
pub const PLACEHOLDER_STORE_URL: &str = "https://placeholder.invalid";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SESSION_WAIT_MS: u64 = 5000;

/// Credentials and endpoints, read from config.json then the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_url: Option<String>,
    pub store_anon_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub session_wait_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: None,
            store_anon_key: None,
            llm_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            session_wait_ms: DEFAULT_SESSION_WAIT_MS,
        }
    }
}

impl Config {
    /// Load config.json (if any) and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config: {}", path.display()))?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("DAYFLOW_STORE_URL") {
            self.store_url = Some(v);
        }
        if let Some(v) = non_empty("DAYFLOW_STORE_ANON_KEY") {
            self.store_anon_key = Some(v);
        }
        if let Some(v) = non_empty("DAYFLOW_LLM_API_KEY") {
            self.llm_api_key = Some(v);
        }
        if let Some(v) = non_empty("DAYFLOW_LLM_BASE_URL") {
            self.llm_base_url = v;
        }
        if let Some(v) = non_empty("DAYFLOW_LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = non_empty("DAYFLOW_SESSION_WAIT_MS") {
            match v.parse() {
                Ok(ms) => self.session_wait_ms = ms,
                Err(_) => warn!(value = %v, "ignoring invalid DAYFLOW_SESSION_WAIT_MS"),
            }
        }
    }

    /// Store endpoint and anon key, with a placeholder when unset
    pub fn store_credentials(&self) -> (String, String) {
        match (&self.store_url, &self.store_anon_key) {
            (Some(url), Some(key)) => (url.clone(), key.clone()),
            _ => {
                warn!("row store credentials missing, using placeholder endpoint");
                (
                    self.store_url
                        .clone()
                        .unwrap_or_else(|| PLACEHOLDER_STORE_URL.to_string()),
                    self.store_anon_key.clone().unwrap_or_default(),
                )
            }
        }
    }

    pub fn session_wait(&self) -> Duration {
        Duration::from_millis(self.session_wait_ms)
    }
}
