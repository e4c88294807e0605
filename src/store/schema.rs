use super::{Filter, Query, RowStore, POSITION_COLUMN, TABLE_PROJECTS, TABLE_TASKS};
use crate::error::StoreError;
use serde_json::{json, Value};
use std::sync::RwLock;
use tracing::{info, warn};

/// Whether the remote schema carries the `position` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Positioned,
    Legacy,
    /// The probe could not decide (e.g. the store was unreachable)
    Unknown,
}

/// Schema capability shared by the controllers, decided once at startup
/// and only ever downgraded afterwards.
#[derive(Debug)]
pub struct Schema {
    capability: RwLock<Capability>,
}

impl Schema {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability: RwLock::new(capability),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
            .read()
            .map(|c| *c)
            .unwrap_or(Capability::Unknown)
    }

    /// Positions are written unless the schema is known to lack them
    pub fn writes_positions(&self) -> bool {
        self.capability() != Capability::Legacy
    }

    pub fn mark_legacy(&self) {
        if let Ok(mut c) = self.capability.write() {
            if *c != Capability::Legacy {
                info!("schema lacks `{}` column, switching to legacy ordering", POSITION_COLUMN);
                *c = Capability::Legacy;
            }
        }
    }
}

/// Probe both ordered tables once for the position column
pub fn probe_schema(store: &dyn RowStore) -> Capability {
    for table in [TABLE_PROJECTS, TABLE_TASKS] {
        let query = Query::table(table).order_by(POSITION_COLUMN, true).limit(1);
        match store.select(&query) {
            Ok(_) => {}
            Err(StoreError::MissingColumn { .. }) => return Capability::Legacy,
            Err(e) => {
                warn!(table, error = %e, "schema probe failed");
                return Capability::Unknown;
            }
        }
    }
    Capability::Positioned
}

/// Run a query ordered by position when the schema allows it.
///
/// Under a legacy schema the order is dropped up front. Otherwise a
/// missing-column failure retries the query without its order and marks
/// the schema legacy so later queries skip the failing attempt.
pub fn select_ordered(
    store: &dyn RowStore,
    query: Query,
    schema: &Schema,
) -> Result<Vec<Value>, StoreError> {
    if schema.capability() == Capability::Legacy {
        return store.select(&query.without_order());
    }
    match store.select(&query) {
        Err(StoreError::MissingColumn { column }) if query.order.is_some() => {
            warn!(table = %query.table, column = %column, "ordered select failed, retrying without order");
            schema.mark_legacy();
            store.select(&query.without_order())
        }
        other => other,
    }
}

/// Insert a row with `position` set, dropping the column if the schema lacks it
pub fn insert_positioned(
    store: &dyn RowStore,
    schema: &Schema,
    table: &str,
    mut row: Value,
    position: i64,
) -> Result<Value, StoreError> {
    if !schema.writes_positions() {
        return store.insert(table, row);
    }
    row[POSITION_COLUMN] = json!(position);
    match store.insert(table, row.clone()) {
        Err(StoreError::MissingColumn { .. }) => {
            schema.mark_legacy();
            if let Value::Object(map) = &mut row {
                map.remove(POSITION_COLUMN);
            }
            store.insert(table, row)
        }
        other => other,
    }
}

/// Write zero-based positions one row at a time, in order.
///
/// Does nothing under a legacy schema; a missing-column failure marks the
/// schema legacy and stops without error.
pub fn write_positions(
    store: &dyn RowStore,
    schema: &Schema,
    table: &str,
    updates: &[(String, i64)],
) -> Result<(), StoreError> {
    if !schema.writes_positions() {
        return Ok(());
    }
    for (id, position) in updates {
        let result = store.update(
            table,
            &[Filter::eq("id", id.clone())],
            json!({ POSITION_COLUMN: position }),
        );
        match result {
            Ok(()) => {}
            Err(StoreError::MissingColumn { .. }) => {
                schema.mark_legacy();
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_probe_detects_legacy_schema() {
        let store = MemoryStore::legacy();
        assert_eq!(probe_schema(&store), Capability::Legacy);

        let store = MemoryStore::new();
        assert_eq!(probe_schema(&store), Capability::Positioned);
    }

    #[test]
    fn test_select_ordered_falls_back_once() {
        let store = MemoryStore::legacy();
        store
            .insert(TABLE_PROJECTS, json!({"name": "A", "user_id": "u"}))
            .unwrap();
        let schema = Schema::new(Capability::Unknown);

        let rows = select_ordered(
            &store,
            Query::table(TABLE_PROJECTS).order_by(POSITION_COLUMN, true),
            &schema,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(schema.capability(), Capability::Legacy);
        assert!(!schema.writes_positions());

        let selects_before = store.operations().len();
        select_ordered(
            &store,
            Query::table(TABLE_PROJECTS).order_by(POSITION_COLUMN, true),
            &schema,
        )
        .unwrap();
        // Only the unordered select is issued once the schema is known
        assert_eq!(store.operations().len(), selects_before + 1);
    }

    #[test]
    fn test_select_ordered_keeps_other_errors() {
        let store = MemoryStore::new();
        store.fail_next("select", TABLE_PROJECTS, StoreError::Transport("down".into()));
        let schema = Schema::new(Capability::Positioned);
        let result = select_ordered(
            &store,
            Query::table(TABLE_PROJECTS).order_by(POSITION_COLUMN, true),
            &schema,
        );
        assert!(matches!(result, Err(StoreError::Transport(_))));
        assert_eq!(schema.capability(), Capability::Positioned);
    }

    #[test]
    fn test_write_positions_sequentially() {
        let store = MemoryStore::new();
        let a = store.insert(TABLE_TASKS, json!({"title": "a", "position": 5})).unwrap();
        let b = store.insert(TABLE_TASKS, json!({"title": "b", "position": 5})).unwrap();
        let schema = Schema::new(Capability::Positioned);
        let updates = vec![
            (b["id"].as_str().unwrap().to_string(), 0),
            (a["id"].as_str().unwrap().to_string(), 1),
        ];

        write_positions(&store, &schema, TABLE_TASKS, &updates).unwrap();
        let rows = store.rows(TABLE_TASKS);
        assert_eq!(rows[0]["position"], 1);
        assert_eq!(rows[1]["position"], 0);
        assert_eq!(
            store.operations().iter().filter(|op| op.kind == "update").count(),
            2
        );
    }

    #[test]
    fn test_write_positions_skipped_on_legacy() {
        let store = MemoryStore::legacy();
        let schema = Schema::new(Capability::Unknown);
        let updates = vec![("x".to_string(), 0), ("y".to_string(), 1)];

        write_positions(&store, &schema, TABLE_TASKS, &updates).unwrap();
        assert_eq!(schema.capability(), Capability::Legacy);
        assert_eq!(store.operations().len(), 1);

        write_positions(&store, &schema, TABLE_TASKS, &updates).unwrap();
        assert_eq!(store.operations().len(), 1);
    }
}
