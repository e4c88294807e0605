use super::{Filter, Query, RowStore, POSITION_COLUMN, TABLE_PROJECTS, TABLE_TASKS};
use crate::error::StoreError;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

/// A call made against the store, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOp {
    pub kind: &'static str,
    pub table: String,
    pub filters: Vec<Filter>,
}

struct InjectedFailure {
    kind: String,
    table: String,
    error: StoreError,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    operations: Vec<RecordedOp>,
    failures: VecDeque<InjectedFailure>,
}

/// In-process row store used in offline mode and in tests.
///
/// Mirrors the hosted store closely enough for the controllers: ids are
/// assigned on insert, deleting a project cascades to its tasks, and a
/// schema without the `position` column rejects it like the real one does.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    missing_columns: HashSet<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            missing_columns: HashSet::new(),
        }
    }

    /// A store whose schema predates the position column
    pub fn legacy() -> Self {
        let mut store = Self::new();
        store.missing_columns.insert(POSITION_COLUMN.to_string());
        store
    }

    /// Make the next matching call (`"select"`, `"insert"`, `"update"`,
    /// `"delete"`) on `table` fail with `error`
    pub fn fail_next(&self, kind: &str, table: &str, error: StoreError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures.push_back(InjectedFailure {
                kind: kind.to_string(),
                table: table.to_string(),
                error,
            });
        }
    }

    pub fn operations(&self) -> Vec<RecordedOp> {
        self.inner
            .lock()
            .map(|inner| inner.operations.clone())
            .unwrap_or_default()
    }

    /// All rows of a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .lock()
            .map(|inner| inner.tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Transport("memory store poisoned".to_string()))
    }

    fn check_columns<'a>(&self, mut columns: impl Iterator<Item = &'a String>) -> Result<(), StoreError> {
        match columns.find(|c| self.missing_columns.contains(*c)) {
            Some(column) => Err(StoreError::MissingColumn {
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn record(inner: &mut Inner, kind: &'static str, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
    inner.operations.push(RecordedOp {
        kind,
        table: table.to_string(),
        filters: filters.to_vec(),
    });
    if let Some(pos) = inner
        .failures
        .iter()
        .position(|f| f.kind == kind && f.table == table)
    {
        if let Some(failure) = inner.failures.remove(pos) {
            return Err(failure.error);
        }
    }
    Ok(())
}

fn value_matches(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        Some(Value::Null) | None => expected == "null",
        _ => false,
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|f| value_matches(row.get(&f.column), &f.value))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = |v: Option<&Value>| match v {
        None | Some(Value::Null) => 1,
        _ => 0,
    };
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

impl RowStore for MemoryStore {
    fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        let mut inner = self.lock()?;
        record(&mut inner, "select", &query.table, &query.filters)?;
        self.check_columns(
            query
                .filters
                .iter()
                .map(|f| &f.column)
                .chain(query.order.iter().map(|o| &o.column)),
        )?;

        let mut rows: Vec<Value> = inner
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let mut inner = self.lock()?;
        record(&mut inner, "insert", table, &[])?;

        let mut object = match row {
            Value::Object(map) => map,
            _ => return Err(StoreError::Decode("row must be a JSON object".to_string())),
        };
        self.check_columns(object.keys())?;
        if !object.contains_key("id") {
            object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let stored = Value::Object(object);
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        record(&mut inner, "update", table, filters)?;

        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => return Err(StoreError::Decode("patch must be a JSON object".to_string())),
        };
        self.check_columns(patch.keys())?;
        if let Some(rows) = inner.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                if let Value::Object(map) = row {
                    for (k, v) in &patch {
                        map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        record(&mut inner, "delete", table, filters)?;

        let mut removed_ids = Vec::new();
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|row| {
                if matches_all(row, filters) {
                    if let Some(Value::String(id)) = row.get("id") {
                        removed_ids.push(id.clone());
                    }
                    false
                } else {
                    true
                }
            });
        }

        if table == TABLE_PROJECTS && !removed_ids.is_empty() {
            if let Some(tasks) = inner.tables.get_mut(TABLE_TASKS) {
                tasks.retain(|task| match task.get("project_id") {
                    Some(Value::String(pid)) => !removed_ids.contains(pid),
                    _ => true,
                });
            }
        }
        Ok(())
    }
}

/// A `MemoryStore` whose writes take `delay`, like a slow network
#[cfg(test)]
pub(crate) struct SlowStore {
    pub inner: MemoryStore,
    pub delay: std::time::Duration,
}

#[cfg(test)]
impl SlowStore {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
        }
    }
}

#[cfg(test)]
impl RowStore for SlowStore {
    fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.inner.select(query)
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        std::thread::sleep(self.delay);
        self.inner.insert(table, row)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<(), StoreError> {
        std::thread::sleep(self.delay);
        self.inner.update(table, filters, patch)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        std::thread::sleep(self.delay);
        self.inner.delete(table, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_assigns_id_and_select_filters() {
        let store = MemoryStore::new();
        let row = store
            .insert(TABLE_PROJECTS, json!({"name": "A", "user_id": "u1"}))
            .unwrap();
        assert!(row.get("id").is_some());
        store
            .insert(TABLE_PROJECTS, json!({"name": "B", "user_id": "u2"}))
            .unwrap();

        let rows = store
            .select(&Query::table(TABLE_PROJECTS).eq("user_id", "u1"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "A");
    }

    #[test]
    fn test_select_orders_nulls_last() {
        let store = MemoryStore::new();
        store.insert(TABLE_TASKS, json!({"title": "c"})).unwrap();
        store.insert(TABLE_TASKS, json!({"title": "b", "position": 1})).unwrap();
        store.insert(TABLE_TASKS, json!({"title": "a", "position": 0})).unwrap();

        let rows = store
            .select(&Query::table(TABLE_TASKS).order_by(POSITION_COLUMN, true))
            .unwrap();
        let titles: Vec<&str> = rows.iter().filter_map(|r| r["title"].as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delete_project_cascades() {
        let store = MemoryStore::new();
        let p = store.insert(TABLE_PROJECTS, json!({"name": "A"})).unwrap();
        let pid = p["id"].as_str().unwrap().to_string();
        store
            .insert(TABLE_TASKS, json!({"title": "t", "project_id": pid}))
            .unwrap();
        store
            .insert(TABLE_TASKS, json!({"title": "other", "project_id": "x"}))
            .unwrap();

        store
            .delete(TABLE_PROJECTS, &[Filter::eq("id", pid.clone())])
            .unwrap();
        assert_eq!(store.rows(TABLE_PROJECTS).len(), 0);
        assert_eq!(store.rows(TABLE_TASKS).len(), 1);
    }

    #[test]
    fn test_legacy_rejects_position() {
        let store = MemoryStore::legacy();
        let err = store
            .insert(TABLE_TASKS, json!({"title": "t", "position": 0}))
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { column } if column == "position"));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next("update", TABLE_TASKS, StoreError::Transport("boom".into()));
        assert!(store
            .update(TABLE_TASKS, &[Filter::eq("id", "1")], json!({"title": "x"}))
            .is_err());
        assert!(store
            .update(TABLE_TASKS, &[Filter::eq("id", "1")], json!({"title": "x"}))
            .is_ok());
    }
}
