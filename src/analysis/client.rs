use crate::config::Config;
use crate::domain::AnalysisResult;
use crate::error::AnalysisError;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const TEMPERATURE: f64 = 0.3;

const SYSTEM_INSTRUCTION: &str = "You turn spoken brain dumps into structured plans. \
Respond with a single JSON object and nothing else: no prose, no markdown, no code fences.";

/// Status and body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// A chat-completions endpoint: one POST per call
pub trait ChatEndpoint: Send + Sync {
    fn post(&self, api_key: &str, body: &Value) -> Result<HttpReply, AnalysisError>;
}

/// Chat-completions over HTTP
pub struct HttpChatEndpoint {
    url: String,
    client: Client,
}

impl HttpChatEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            client: Client::new(),
        }
    }
}

impl ChatEndpoint for HttpChatEndpoint {
    fn post(&self, api_key: &str, body: &Value) -> Result<HttpReply, AnalysisError> {
        debug!(url = %self.url, "posting chat completion");
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

/// Turns transcripts into projects, tasks and insights
pub struct AnalysisClient {
    endpoint: Box<dyn ChatEndpoint>,
    api_key: Option<String>,
    model: String,
}

impl AnalysisClient {
    pub fn new(endpoint: Box<dyn ChatEndpoint>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Box::new(HttpChatEndpoint::new(&config.llm_base_url)),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        )
    }

    /// Analyse a transcript; any failure yields the fallback result
    pub fn analyze(&self, transcript: &str) -> AnalysisResult {
        match self.analyze_detailed(transcript) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "analysis failed, using fallback result");
                AnalysisResult::fallback()
            }
        }
    }

    /// Analyse a transcript, reporting why it failed
    pub fn analyze_detailed(&self, transcript: &str) -> Result<AnalysisResult, AnalysisError> {
        if transcript.trim().is_empty() {
            return Err(AnalysisError::EmptyTranscript);
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AnalysisError::MissingCredential)?;

        let body = self.request_body(transcript);
        info!(model = %self.model, chars = transcript.len(), "requesting transcript analysis");
        let reply = self.endpoint.post(api_key, &body)?;

        if !(200..300).contains(&reply.status) {
            return Err(AnalysisError::Status {
                status: reply.status,
                body: truncate(&reply.body, 500),
            });
        }

        let envelope: Value =
            serde_json::from_str(&reply.body).map_err(|e| AnalysisError::Parse(e.to_string()))?;
        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AnalysisError::EmptyChoice)?;

        let parsed: Value = serde_json::from_str(strip_code_fence(content))
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;
        let result = AnalysisResult::from_json(&parsed)?;
        info!(
            projects = result.projects.len(),
            tasks = result.tasks.len(),
            "analysis complete"
        );
        Ok(result)
    }

    fn request_body(&self, transcript: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTION},
                {"role": "user", "content": build_prompt(transcript)},
            ],
        })
    }
}

/// Prompt asking for the analysis schema, with the transcript embedded
pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Read the transcript below and extract what the speaker wants to do.

Return JSON with exactly these fields:
{{
  "projects": [{{"name": string, "description": string, "status": "active" | "archived" | "completed"}}],
  "tasks": [{{"title": string, "description": string, "priority": "low" | "medium" | "high", "project_name": string}}],
  "insights": {{"dreams": [string], "difficulties": [string], "goals": [string]}}
}}

Every task's "project_name" must equal the "name" of one of the projects you return.
Keep titles short and actionable.

Transcript:
"""
{}
""""#,
        transcript.trim()
    )
}

/// Some models wrap JSON in a markdown fence even in JSON mode
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Priority;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Endpoint returning a fixed reply and remembering the request
    pub(crate) struct ScriptedEndpoint {
        reply: Result<HttpReply, String>,
        pub(crate) seen: Mutex<Vec<Value>>,
    }

    impl ScriptedEndpoint {
        pub(crate) fn ok(status: u16, body: &str) -> Self {
            Self {
                reply: Ok(HttpReply {
                    status,
                    body: body.to_string(),
                }),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn content(content: &Value) -> Self {
            let envelope = json!({
                "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
            });
            Self::ok(200, &envelope.to_string())
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatEndpoint for ScriptedEndpoint {
        fn post(&self, _api_key: &str, body: &Value) -> Result<HttpReply, AnalysisError> {
            self.seen.lock().unwrap().push(body.clone());
            self.reply.clone().map_err(AnalysisError::Transport)
        }
    }

    fn client(endpoint: ScriptedEndpoint) -> AnalysisClient {
        AnalysisClient::new(Box::new(endpoint), Some("sk-test".to_string()), "test-model")
    }

    fn well_formed() -> Value {
        json!({
            "projects": [{"name": "Garden", "description": "Balcony garden", "status": "active"}],
            "tasks": [
                {"title": "Buy seeds", "description": "", "priority": "high", "project_name": "Garden"},
                {"title": "Water daily", "description": "", "priority": "low", "project_name": "Garden"}
            ],
            "insights": {"dreams": ["Eat my own tomatoes"], "difficulties": ["No time"], "goals": []}
        })
    }

    #[test]
    fn test_well_formed_response() {
        let client = client(ScriptedEndpoint::content(&well_formed()));
        let result = client.analyze("I want to grow tomatoes on the balcony");

        assert_eq!(result.projects.len(), 1);
        assert_eq!(result.tasks.len(), 2);
        assert!(result.tasks.iter().all(|t| t.project_name == "Garden"));
        assert_eq!(result.tasks[0].priority, Priority::High);
        assert_eq!(result.insights.difficulties, vec!["No time".to_string()]);
    }

    #[test]
    fn test_request_body_shape() {
        let endpoint = ScriptedEndpoint::content(&well_formed());
        let client = client(endpoint);
        let body = client.request_body("plan the trip");

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("plan the trip"));
    }

    #[test]
    fn test_non_2xx_returns_fallback() {
        let client = client(ScriptedEndpoint::ok(500, "upstream exploded"));
        assert!(matches!(
            client.analyze_detailed("hello"),
            Err(AnalysisError::Status { status: 500, .. })
        ));
        assert_eq!(client.analyze("hello"), AnalysisResult::fallback());

        let client = self::client(ScriptedEndpoint::ok(429, "{}"));
        assert!(client.analyze("hello").is_fallback());
    }

    #[test]
    fn test_missing_credential_returns_fallback() {
        let endpoint = ScriptedEndpoint::content(&well_formed());
        let client = AnalysisClient::new(Box::new(endpoint), None, "m");
        assert!(matches!(
            client.analyze_detailed("hello"),
            Err(AnalysisError::MissingCredential)
        ));
        assert!(client.analyze("hello").is_fallback());
    }

    #[test]
    fn test_transport_error_returns_fallback() {
        let client = client(ScriptedEndpoint::failing("connection refused"));
        assert!(client.analyze("hello").is_fallback());
    }

    #[test]
    fn test_unparsable_and_incomplete_content() {
        let envelope = json!({"choices": [{"message": {"content": "not json at all"}}]});
        let client = client(ScriptedEndpoint::ok(200, &envelope.to_string()));
        assert!(matches!(
            client.analyze_detailed("hello"),
            Err(AnalysisError::Parse(_))
        ));

        let client = self::client(ScriptedEndpoint::content(&json!({"projects": []})));
        assert!(matches!(
            client.analyze_detailed("hello"),
            Err(AnalysisError::Schema("tasks"))
        ));

        let client = self::client(ScriptedEndpoint::ok(200, r#"{"choices": []}"#));
        assert!(matches!(
            client.analyze_detailed("hello"),
            Err(AnalysisError::EmptyChoice)
        ));
    }

    #[test]
    fn test_empty_transcript_skips_request() {
        let endpoint = ScriptedEndpoint::content(&well_formed());
        let client = AnalysisClient::new(Box::new(endpoint), Some("k".into()), "m");
        assert!(matches!(
            client.analyze_detailed("   "),
            Err(AnalysisError::EmptyTranscript)
        ));
        assert!(client.analyze("").is_fallback());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {} "), "{}");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo", 2), "h…");
    }
}
