//! SQLite binding of the resource repository contract.
//!
//! The connection is protected by a
//! `parking_lot::ReentrantMutex<RefCell<...>>` so that a transaction scope
//! can hold the lock while the enclosed operations re-acquire it. Driver
//! errors are logged here and re-raised as client-safe errors; a
//! `rusqlite::Error` never crosses the repository boundary.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::{ApiError, Result};
use crate::repository::{ListQuery, ResourceRepository, TransactionControl, TransactionScope};
use crate::resource::{EntityGraph, ResourceDef, ValueKind};
use crate::translate::sql::{json_value_to_sql, render_count, render_select};
use crate::translate::build_plan;

// ============================================================================
// Connection
// ============================================================================

struct ConnState {
    conn: rusqlite::Connection,
    txn_depth: u32,
    rolled_back: bool,
}

/// A shared SQLite connection with reentrant transaction bookkeeping.
/// Nested transaction scopes collapse into the outermost one: only the
/// outer commit runs `COMMIT`, and any inner rollback poisons the outer
/// scope into rolling back.
pub struct SqliteConnection {
    state: ReentrantMutex<RefCell<ConnState>>,
}

impl SqliteConnection {
    pub fn open(path: &str) -> Result<Arc<Self>> {
        let conn = rusqlite::Connection::open(path).map_err(open_err)?;
        Ok(Self::wrap(conn))
    }

    /// An in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Arc<Self>> {
        let conn = rusqlite::Connection::open_in_memory().map_err(open_err)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: rusqlite::Connection) -> Arc<Self> {
        Arc::new(SqliteConnection {
            state: ReentrantMutex::new(RefCell::new(ConnState {
                conn,
                txn_depth: 0,
                rolled_back: false,
            })),
        })
    }

    /// Create one table per entity in the graph. Intended for tests and
    /// small deployments; production schemas are usually migrated
    /// externally.
    pub fn initialize(&self, graph: &EntityGraph) -> Result<()> {
        for def in graph.entities() {
            let mut columns = vec!["id INTEGER PRIMARY KEY".to_string()];
            for (name, kind) in def.columns() {
                if name == "id" {
                    continue;
                }
                let sql_type = match kind {
                    Some(ValueKind::Int) | Some(ValueKind::Bool) => "INTEGER",
                    Some(ValueKind::Float) => "REAL",
                    _ => "TEXT",
                };
                columns.push(format!("{name} {sql_type}"));
            }
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                def.table,
                columns.join(", ")
            );
            self.with_conn(|conn| conn.execute(&sql, []))
                .map_err(|e| {
                    error!(table = %def.table, error = %e, "failed to create table");
                    ApiError::Forbidden(format!("Could not initialize table '{}'.", def.table))
                })?;
        }
        Ok(())
    }

    /// Execute `f` with a shared reference to the underlying connection.
    fn with_conn<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>,
    {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state.conn)
    }
}

fn open_err(e: rusqlite::Error) -> ApiError {
    error!(error = %e, "failed to open sqlite database");
    ApiError::Forbidden("Could not open database.".to_string())
}

impl TransactionControl for SqliteConnection {
    fn commit(&self) -> Result<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.txn_depth = state.txn_depth.saturating_sub(1);
        if state.txn_depth > 0 {
            return Ok(());
        }
        let sql = if state.rolled_back { "ROLLBACK" } else { "COMMIT" };
        state.rolled_back = false;
        state.conn.execute_batch(sql).map_err(|e| {
            error!(error = %e, "transaction commit failed");
            ApiError::Forbidden("Transaction could not be committed.".to_string())
        })
    }

    fn rollback(&self) -> Result<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.txn_depth = state.txn_depth.saturating_sub(1);
        if state.txn_depth > 0 {
            state.rolled_back = true;
            return Ok(());
        }
        state.rolled_back = false;
        state.conn.execute_batch("ROLLBACK").map_err(|e| {
            error!(error = %e, "transaction rollback failed");
            ApiError::Forbidden("Transaction could not be rolled back.".to_string())
        })
    }
}

// ============================================================================
// Row decoding
// ============================================================================

fn value_ref_to_json(v: rusqlite::types::ValueRef<'_>) -> Value {
    match v {
        rusqlite::types::ValueRef::Null => Value::Null,
        rusqlite::types::ValueRef::Integer(i) => Value::from(i),
        rusqlite::types::ValueRef::Real(f) => Value::from(f),
        rusqlite::types::ValueRef::Text(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
        rusqlite::types::ValueRef::Blob(_) => Value::Null,
    }
}

fn row_to_json(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Value> {
    let mut obj = Map::new();
    for (index, name) in columns.iter().enumerate() {
        obj.insert(name.clone(), value_ref_to_json(row.get_ref(index)?));
    }
    Ok(Value::Object(obj))
}

/// Bind an id from its string form: integer ids must compare as integers
/// under SQLite's type affinity rules.
fn id_param(id: &str) -> rusqlite::types::Value {
    match id.parse::<i64>() {
        Ok(i) => rusqlite::types::Value::Integer(i),
        Err(_) => rusqlite::types::Value::Text(id.to_string()),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// SqliteRepository
// ============================================================================

/// A repository bound to one root entity of an [`EntityGraph`], executing
/// translated query plans over a shared [`SqliteConnection`].
pub struct SqliteRepository {
    connection: Arc<SqliteConnection>,
    graph: EntityGraph,
    root: Arc<ResourceDef>,
    instance_name: String,
}

impl SqliteRepository {
    pub fn new(connection: Arc<SqliteConnection>, graph: EntityGraph, root: Arc<ResourceDef>) -> Self {
        let instance_name = root.type_name.clone();
        SqliteRepository {
            connection,
            graph,
            root,
            instance_name,
        }
    }

    /// Override the name used in human-oriented error messages.
    pub fn with_instance_name(mut self, name: &str) -> Self {
        self.instance_name = name.to_string();
        self
    }

    pub fn connection(&self) -> &Arc<SqliteConnection> {
        &self.connection
    }

    fn query_rows(
        &self,
        sql: &str,
        params: Vec<rusqlite::types::Value>,
    ) -> rusqlite::Result<Vec<Value>> {
        debug!(%sql, "executing select");
        self.connection.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                result.push(row_to_json(row, &columns)?);
            }
            Ok(result)
        })
    }

    /// Validate payload keys against the entity's columns and split them
    /// into column/parameter lists.
    fn payload_columns(
        &self,
        data: &Value,
    ) -> Result<(Vec<String>, Vec<rusqlite::types::Value>), String> {
        let obj = data
            .as_object()
            .ok_or_else(|| "payload must be an object".to_string())?;
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (key, value) in obj {
            if !self.root.has_column(key) {
                return Err(format!("unknown column '{key}'"));
            }
            columns.push(key.clone());
            params.push(json_value_to_sql(value));
        }
        Ok((columns, params))
    }

    fn fetch_by_rowid(&self, rowid: i64) -> rusqlite::Result<Vec<Value>> {
        let sql = format!("SELECT * FROM {} WHERE rowid = ?", self.root.table);
        self.query_rows(&sql, vec![rusqlite::types::Value::Integer(rowid)])
    }
}

impl ResourceRepository for SqliteRepository {
    fn create(&self, data: &Value) -> Result<Value> {
        let forbidden = || {
            ApiError::Forbidden(format!(
                "{} could not be created.",
                capitalize(&self.instance_name)
            ))
        };
        let (columns, params) = self.payload_columns(data).map_err(|cause| {
            error!(instance = %self.instance_name, %cause, "create rejected");
            forbidden()
        })?;
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.root.table,
            columns.join(", "),
            placeholders
        );
        let created = self.connection.with_conn(|conn| {
            conn.execute(&sql, rusqlite::params_from_iter(params))?;
            Ok(conn.last_insert_rowid())
        });
        let rowid = created.map_err(|e| {
            error!(instance = %self.instance_name, error = %e, "create failed");
            forbidden()
        })?;
        let rows = self.fetch_by_rowid(rowid).map_err(|e| {
            error!(instance = %self.instance_name, error = %e, "create readback failed");
            forbidden()
        })?;
        rows.into_iter().next().ok_or_else(forbidden)
    }

    fn get_detail(&self, id: &str) -> Result<Value> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.root.table);
        let rows = self.query_rows(&sql, vec![id_param(id)]).map_err(|e| {
            error!(instance = %self.instance_name, error = %e, "get_detail failed");
            ApiError::Forbidden(format!(
                "Error while getting {} details.",
                self.instance_name
            ))
        })?;
        rows.into_iter().next().ok_or_else(|| {
            ApiError::ObjectNotFound(format!(
                "{} {} not found.",
                capitalize(&self.instance_name),
                id
            ))
        })
    }

    fn get_list(&self, query: &ListQuery) -> Result<Vec<Value>> {
        let plan = build_plan(
            &self.graph,
            &self.root,
            &query.filters,
            &query.sorting,
            query.pagination,
        )?;
        let (sql, params) = render_select(&plan);
        self.query_rows(&sql, params).map_err(|e| {
            error!(instance = %self.instance_name, error = %e, "get_list failed");
            ApiError::Forbidden(format!("Error while getting {} list.", self.instance_name))
        })
    }

    fn get_count(&self, filters: &BTreeMap<String, Value>) -> Result<u64> {
        let plan = build_plan(&self.graph, &self.root, filters, &[], None)?;
        let (sql, params) = render_count(&plan);
        debug!(%sql, "executing count");
        self.connection
            .with_conn(|conn| {
                conn.query_row(&sql, rusqlite::params_from_iter(params), |row| {
                    row.get::<_, i64>(0)
                })
            })
            .map(|count| count.max(0) as u64)
            .map_err(|e| {
                error!(instance = %self.instance_name, error = %e, "get_count failed");
                ApiError::Forbidden(format!("Error while counting {}.", self.instance_name))
            })
    }

    fn update(&self, data: &Value) -> Result<Value> {
        let failed = || {
            ApiError::Forbidden(format!("Error while updating {}.", self.instance_name))
        };
        let id = data
            .get("id")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(failed)?;
        // Surfaces ObjectNotFound before any mutation.
        self.get_detail(&id)?;

        let mut payload = data.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("id");
        }
        let (columns, mut params) = self.payload_columns(&payload).map_err(|cause| {
            error!(instance = %self.instance_name, %cause, "update rejected");
            failed()
        })?;
        if !columns.is_empty() {
            let assignments: Vec<String> =
                columns.iter().map(|c| format!("{c} = ?")).collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                self.root.table,
                assignments.join(", ")
            );
            params.push(id_param(&id));
            self.connection
                .with_conn(|conn| conn.execute(&sql, rusqlite::params_from_iter(params)))
                .map_err(|e| {
                    error!(instance = %self.instance_name, error = %e, "update failed");
                    failed()
                })?;
        }
        self.get_detail(&id)
    }

    fn delete(&self, id: &str) -> Result<()> {
        // Missing rows surface ObjectNotFound, matching get_detail.
        self.get_detail(id)?;
        let sql = format!("DELETE FROM {} WHERE id = ?", self.root.table);
        self.connection
            .with_conn(|conn| conn.execute(&sql, [id_param(id)]))
            .map_err(|e| {
                error!(instance = %self.instance_name, error = %e, "delete failed");
                ApiError::Forbidden(format!("Error while deleting {}.", self.instance_name))
            })?;
        Ok(())
    }

    /// The returned scope holds the connection lock until it commits or
    /// drops, so a transaction excludes other threads while remaining
    /// reentrant within its own call stack.
    fn begin_transaction(&self) -> Result<TransactionScope<'_>> {
        let guard = self.connection.state.lock();
        {
            let mut state = guard.borrow_mut();
            if state.txn_depth == 0 {
                state.conn.execute_batch("BEGIN").map_err(|e| {
                    error!(error = %e, "failed to begin transaction");
                    ApiError::Forbidden("Transaction could not be started.".to_string())
                })?;
            }
            state.txn_depth += 1;
        }
        Ok(TransactionScope::with_lock(&*self.connection, guard))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> (Arc<SqliteConnection>, EntityGraph, Arc<ResourceDef>) {
        let articles = ResourceDef::builder("articles", "articles")
            .attr("title", ValueKind::String)
            .attr("views", ValueKind::Int)
            .build();
        let graph = EntityGraph::new().register(articles.clone());
        let connection = SqliteConnection::open_in_memory().unwrap();
        connection.initialize(&graph).unwrap();
        (connection, graph, articles)
    }

    fn repo() -> SqliteRepository {
        let (connection, graph, articles) = fixture();
        SqliteRepository::new(connection, graph, articles).with_instance_name("article")
    }

    #[test]
    fn create_assigns_id_and_reads_back() {
        let repo = repo();
        let created = repo.create(&json!({"title": "a", "views": 3})).unwrap();
        assert_eq!(created["id"], json!(1));
        assert_eq!(created["title"], json!("a"));
    }

    #[test]
    fn create_with_unknown_column_is_forbidden() {
        let repo = repo();
        let err = repo.create(&json!({"bogus": 1})).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(err.detail(), "Article could not be created.");
    }

    #[test]
    fn get_detail_not_found() {
        let repo = repo();
        let err = repo.get_detail("7").unwrap_err();
        assert!(matches!(err, ApiError::ObjectNotFound(_)));
        assert_eq!(err.detail(), "Article 7 not found.");
    }

    #[test]
    fn update_changes_named_columns_only() {
        let repo = repo();
        repo.create(&json!({"title": "a", "views": 1})).unwrap();
        let updated = repo.update(&json!({"id": 1, "views": 9})).unwrap();
        assert_eq!(updated["title"], json!("a"));
        assert_eq!(updated["views"], json!(9));
    }

    #[test]
    fn update_missing_row_is_not_found() {
        let repo = repo();
        let err = repo.update(&json!({"id": 42, "views": 9})).unwrap_err();
        assert!(matches!(err, ApiError::ObjectNotFound(_)));
    }

    #[test]
    fn delete_then_detail_fails() {
        let repo = repo();
        repo.create(&json!({"title": "a"})).unwrap();
        repo.delete("1").unwrap();
        assert!(repo.get_detail("1").is_err());
    }

    #[test]
    fn transaction_rolls_back_on_drop() {
        let repo = repo();
        {
            let _scope = repo.begin_transaction().unwrap();
            repo.create(&json!({"title": "uncommitted"})).unwrap();
        }
        assert_eq!(repo.get_count(&BTreeMap::new()).unwrap(), 0);
    }

    #[test]
    fn transaction_commits_explicitly() {
        let repo = repo();
        let scope = repo.begin_transaction().unwrap();
        repo.create(&json!({"title": "kept"})).unwrap();
        scope.commit().unwrap();
        assert_eq!(repo.get_count(&BTreeMap::new()).unwrap(), 1);
    }

    #[test]
    fn open_scope_excludes_other_threads() {
        let repo = repo();
        let scope = repo.begin_transaction().unwrap();

        let connection = repo.connection().clone();
        let contended = std::thread::spawn(move || connection.state.try_lock().is_none())
            .join()
            .unwrap();
        assert!(contended);

        scope.commit().unwrap();
        let connection = repo.connection().clone();
        let contended = std::thread::spawn(move || connection.state.try_lock().is_none())
            .join()
            .unwrap();
        assert!(!contended);
    }

    #[test]
    fn nested_scopes_collapse_into_outer() {
        let repo = repo();
        let outer = repo.begin_transaction().unwrap();
        {
            let inner = repo.begin_transaction().unwrap();
            repo.create(&json!({"title": "inner"})).unwrap();
            inner.commit().unwrap();
        }
        repo.create(&json!({"title": "outer"})).unwrap();
        outer.commit().unwrap();
        assert_eq!(repo.get_count(&BTreeMap::new()).unwrap(), 2);
    }
}
