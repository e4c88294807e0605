pub mod memory;
pub mod rest;
pub mod schema;

pub use memory::MemoryStore;
#[cfg(test)]
pub(crate) use memory::SlowStore;
pub use rest::RestStore;
pub use schema::{
    insert_positioned, probe_schema, select_ordered, write_positions, Capability, Schema,
};

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const TABLE_PROJECTS: &str = "projects";
pub const TABLE_TASKS: &str = "tasks";
pub const TABLE_TRANSCRIPTS: &str = "transcripts";
pub const TABLE_SESSION_HISTORY: &str = "session_history";

/// Column used for persisted ordering (absent in older schemas)
pub const POSITION_COLUMN: &str = "position";

/// Equality predicate on a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Table-scoped select
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn without_order(mut self) -> Self {
        self.order = None;
        self
    }
}

/// Row-oriented access to the hosted store.
///
/// Rows are JSON objects; every row is scoped to an owning `user_id` by the
/// caller. Deleting a project is expected to cascade to its tasks.
pub trait RowStore: Send + Sync {
    fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Insert one row and return it as stored (with its assigned `id`)
    fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<(), StoreError>;

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;

    /// Use a user's access token for subsequent requests
    fn set_access_token(&self, _token: Option<String>) {}
}

/// Decode selected rows into typed records
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| StoreError::Decode(e.to_string())))
        .collect()
}

/// `id` of a row returned by an insert
pub fn row_id(row: &Value) -> Result<String, StoreError> {
    match row.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StoreError::Decode("inserted row has no id".to_string())),
    }
}
