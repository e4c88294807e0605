use super::{Filter, Query, RowStore};
use crate::error::StoreError;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::RwLock;
use tracing::debug;

/// Row store speaking the PostgREST dialect of the hosted backend
pub struct RestStore {
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
    client: Client,
}

impl RestStore {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: RwLock::new(None),
            client: Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn bearer(&self) -> String {
        let token = self
            .access_token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
    }

    fn send(&self, method: &str, url: &str, builder: RequestBuilder) -> Result<String, StoreError> {
        debug!(method, url, auth = %mask_bearer(&self.bearer()), "row store request");
        let resp = builder.send()?;
        read_response(resp)
    }
}

/// Keep only a short prefix of a bearer token for logs
pub(crate) fn mask_bearer(value: &str) -> String {
    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    if token.len() <= 8 {
        return "Bearer ***".to_string();
    }
    let prefix: String = token.chars().take(6).collect();
    format!("Bearer {}…", prefix)
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect()
}

/// Query-string parameters for a select
pub(crate) fn select_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn read_response(resp: Response) -> Result<String, StoreError> {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    debug!(status = status.as_u16(), "row store response");
    if status.is_success() {
        Ok(text)
    } else {
        Err(classify_error(status.as_u16(), &text))
    }
}

/// Turn an error body into a `StoreError`, recognising missing columns.
///
/// Reads report `42703 column projects.position does not exist`; writes
/// report `PGRST204 Could not find the 'position' column of 'tasks'`. The
/// read message is recognised without its code too.
pub(crate) fn classify_error(status: u16, body: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    let column = match code.as_deref() {
        Some("PGRST204") => between(&message, "the '", "' column").map(str::to_string),
        // 42703, or a proxy that dropped the code
        _ => between(&message, "column ", " does not exist")
            .map(|c| c.rsplit('.').next().unwrap_or(c).trim_matches('"').to_string()),
    };

    match column {
        Some(column) => StoreError::MissingColumn { column },
        None => StoreError::Status {
            status,
            code,
            message,
        },
    }
}

fn between<'a>(s: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = s.find(start)? + start.len();
    let to = from + s[from..].find(end)?;
    Some(&s[from..to])
}

impl RowStore for RestStore {
    fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        let url = self.table_url(&query.table);
        let builder = self
            .authorized(self.client.get(&url))
            .query(&select_params(query));
        let text = self.send("GET", &url, builder)?;
        serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let url = self.table_url(table);
        let builder = self
            .authorized(self.client.post(&url))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .json(&row);
        let text = self.send("POST", &url, builder)?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        match value {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            Value::Object(_) => Ok(value),
            _ => Err(StoreError::Decode("insert returned no rows".to_string())),
        }
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<(), StoreError> {
        let url = self.table_url(table);
        let builder = self
            .authorized(self.client.patch(&url))
            .query(&filter_params(filters))
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .json(&patch);
        self.send("PATCH", &url, builder).map(|_| ())
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let url = self.table_url(table);
        let builder = self
            .authorized(self.client.delete(&url))
            .query(&filter_params(filters));
        self.send("DELETE", &url, builder).map(|_| ())
    }

    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.access_token.write() {
            *slot = token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{POSITION_COLUMN, TABLE_TASKS};

    #[test]
    fn test_mask_bearer() {
        assert_eq!(mask_bearer("Bearer eyJhbGciOiJIUzI1NiJ9.payload"), "Bearer eyJhbG…");
        assert_eq!(mask_bearer("Bearer short"), "Bearer ***");
    }

    #[test]
    fn test_select_params() {
        let q = Query::table(TABLE_TASKS)
            .eq("project_id", "p1")
            .order_by(POSITION_COLUMN, false)
            .limit(5);
        let params = select_params(&q);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("project_id".to_string(), "eq.p1".to_string()),
                ("order".to_string(), "position.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_classify_missing_column_on_read() {
        let body = r#"{"code":"42703","details":null,"hint":null,"message":"column projects.position does not exist"}"#;
        match classify_error(400, body) {
            StoreError::MissingColumn { column } => assert_eq!(column, "position"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_missing_column_on_write() {
        let body = r#"{"code":"PGRST204","message":"Could not find the 'position' column of 'tasks' in the schema cache"}"#;
        assert!(matches!(
            classify_error(400, body),
            StoreError::MissingColumn { column } if column == "position"
        ));
    }

    #[test]
    fn test_classify_missing_column_without_code() {
        let body = r#"{"message":"column tasks.position does not exist"}"#;
        assert!(matches!(
            classify_error(400, body),
            StoreError::MissingColumn { column } if column == "position"
        ));
        assert!(matches!(
            classify_error(400, "column \"position\" does not exist"),
            StoreError::MissingColumn { column } if column == "position"
        ));
    }

    #[test]
    fn test_classify_other_errors() {
        let err = classify_error(401, r#"{"code":"PGRST301","message":"JWT expired"}"#);
        match err {
            StoreError::Status { status, code, message } => {
                assert_eq!(status, 401);
                assert_eq!(code.as_deref(), Some("PGRST301"));
                assert_eq!(message, "JWT expired");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            classify_error(502, "Bad Gateway"),
            StoreError::Status { status: 502, .. }
        ));
    }
}
