//! Nested/composite repository: transactional fan-out of an aggregate root
//! plus its declared child collections, with client-supplied temporary
//! identifiers remapped to server-assigned ones.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;

use super::{ListQuery, ResourceRepository};

/// The payload member carrying a client-local temporary identifier.
pub const TEMP_ID_FIELD: &str = "__id__";

// ============================================================================
// IdMap
// ============================================================================

/// Request-scoped correlation of client temporary ids to server-assigned
/// ids. Passed by reference through the recursive create calls and
/// discarded at request end - never global state.
#[derive(Debug, Default)]
pub struct IdMap {
    map: BTreeMap<String, Value>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, temp_id: String, assigned: Value) {
        self.map.insert(temp_id, assigned);
    }

    pub fn resolve(&self, temp_id: &str) -> Option<&Value> {
        self.map.get(temp_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ============================================================================
// ChildRepository
// ============================================================================

/// One declared child collection: the repository persisting its rows and
/// the child column holding the parent's id.
pub struct ChildRepository {
    pub repository: Box<dyn ResourceRepository>,
    pub foreign_parent_name: String,
}

impl ChildRepository {
    pub fn new(repository: Box<dyn ResourceRepository>, foreign_parent_name: &str) -> Self {
        ChildRepository {
            repository,
            foreign_parent_name: foreign_parent_name.to_string(),
        }
    }
}

// ============================================================================
// NestedRepository
// ============================================================================

/// Wraps a repository to create an aggregate root together with its child
/// collections inside one transaction scope. Reads and deletes delegate
/// unchanged.
pub struct NestedRepository<R: ResourceRepository> {
    repository: R,
    children: BTreeMap<String, ChildRepository>,
}

impl<R: ResourceRepository> NestedRepository<R> {
    pub fn new(repository: R, children: BTreeMap<String, ChildRepository>) -> Self {
        NestedRepository {
            repository,
            children,
        }
    }

    /// Whether the payload carries every declared child collection.
    fn has_nested_payload(&self, data: &Value) -> bool {
        match data.as_object() {
            Some(obj) => self.children.keys().all(|field| obj.contains_key(field)),
            None => false,
        }
    }

    /// The root's own fields: the payload minus the child collections.
    fn root_payload(&self, data: &Value) -> Value {
        let mut obj = data.as_object().cloned().unwrap_or_default();
        for field in self.children.keys() {
            obj.remove(field);
        }
        Value::Object(obj)
    }

    /// Create the root plus every child row, all inside one transaction;
    /// `id_map` collects temporary-id correlations as children persist.
    pub fn create(&self, data: &Value, id_map: &mut IdMap) -> Result<Value> {
        if !self.has_nested_payload(data) {
            return self.repository.create(data);
        }
        let scope = self.repository.begin_transaction()?;
        let root = self.repository.create(&self.root_payload(data))?;
        let root_id = root.get("id").cloned().unwrap_or(Value::Null);

        for (field, child) in &self.children {
            let rows = data
                .get(field)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            for row in rows {
                let mut obj = row.as_object().cloned().unwrap_or_default();
                let temp_id = obj
                    .remove(TEMP_ID_FIELD)
                    .and_then(|v| v.as_str().map(|s| s.to_string()));
                obj.insert(child.foreign_parent_name.clone(), root_id.clone());
                let created = child.repository.create(&Value::Object(obj))?;
                if let Some(temp_id) = temp_id {
                    let assigned = created.get("id").cloned().unwrap_or(Value::Null);
                    id_map.record(temp_id, assigned);
                }
            }
        }

        scope.commit()?;
        Ok(root)
    }

    pub fn get_detail(&self, id: &str) -> Result<Value> {
        self.repository.get_detail(id)
    }

    pub fn get_list(&self, query: &ListQuery) -> Result<Vec<Value>> {
        self.repository.get_list(query)
    }

    pub fn update(&self, data: &Value) -> Result<Value> {
        self.repository.update(data)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Appends created payloads to a shared log and assigns sequential ids.
    struct RecordingRepository {
        name: &'static str,
        log: Arc<Mutex<Vec<(String, Value)>>>,
        next_id: Mutex<i64>,
        fail: bool,
    }

    impl RecordingRepository {
        fn new(name: &'static str, log: Arc<Mutex<Vec<(String, Value)>>>) -> Self {
            RecordingRepository {
                name,
                log,
                next_id: Mutex::new(1),
                fail: false,
            }
        }
    }

    impl ResourceRepository for RecordingRepository {
        fn create(&self, data: &Value) -> Result<Value> {
            if self.fail {
                return Err(ApiError::Forbidden("boom".to_string()));
            }
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            let mut obj = data.as_object().cloned().unwrap_or_default();
            obj.insert("id".to_string(), json!(id));
            let entity = Value::Object(obj);
            self.log.lock().push((self.name.to_string(), entity.clone()));
            Ok(entity)
        }
    }

    fn nested() -> (
        NestedRepository<RecordingRepository>,
        Arc<Mutex<Vec<(String, Value)>>>,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let parent = RecordingRepository::new("orders", log.clone());
        let lines = RecordingRepository::new("lines", log.clone());
        let mut children = BTreeMap::new();
        children.insert(
            "lines".to_string(),
            ChildRepository::new(Box::new(lines), "order_id"),
        );
        (NestedRepository::new(parent, children), log)
    }

    #[test]
    fn flat_payload_delegates() {
        let (repo, log) = nested();
        let mut id_map = IdMap::new();
        let created = repo.create(&json!({"total": 5}), &mut id_map).unwrap();
        assert_eq!(created["id"], json!(1));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn nested_payload_fans_out_with_foreign_key() {
        let (repo, log) = nested();
        let mut id_map = IdMap::new();
        let created = repo
            .create(
                &json!({
                    "total": 5,
                    "lines": [
                        {"__id__": "tmp-1", "sku": "a"},
                        {"sku": "b"}
                    ]
                }),
                &mut id_map,
            )
            .unwrap();

        let log = log.lock();
        assert_eq!(created["total"], json!(5));
        assert!(created.get("lines").is_none());
        assert_eq!(log.len(), 3);
        // Children carry the parent id, and temp id is stripped.
        let (_, first_line) = &log[1];
        assert_eq!(first_line["order_id"], created["id"]);
        assert!(first_line.get(TEMP_ID_FIELD).is_none());
    }

    #[test]
    fn temporary_ids_are_correlated() {
        let (repo, _) = nested();
        let mut id_map = IdMap::new();
        repo.create(
            &json!({"total": 1, "lines": [{"__id__": "tmp-9", "sku": "x"}]}),
            &mut id_map,
        )
        .unwrap();
        assert_eq!(id_map.resolve("tmp-9"), Some(&json!(1)));
        assert_eq!(id_map.resolve("tmp-0"), None);
    }

    #[test]
    fn child_failure_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let parent = RecordingRepository::new("orders", log.clone());
        let mut lines = RecordingRepository::new("lines", log.clone());
        lines.fail = true;
        let mut children = BTreeMap::new();
        children.insert(
            "lines".to_string(),
            ChildRepository::new(Box::new(lines), "order_id"),
        );
        let repo = NestedRepository::new(parent, children);
        let mut id_map = IdMap::new();
        let err = repo
            .create(&json!({"total": 1, "lines": [{"sku": "x"}]}), &mut id_map)
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
