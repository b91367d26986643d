//! The storage-agnostic resource repository contract consumed by
//! HTTP-facing views.

pub mod nested;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::query::page::Page;

pub use nested::{ChildRepository, IdMap, NestedRepository};

// ============================================================================
// ListQuery
// ============================================================================

/// The normalized inputs of one `get_list` call.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Normalized filter mapping: `path__operator` to coerced value.
    pub filters: BTreeMap<String, Value>,
    /// Storage attribute names, `-` prefix for descending.
    pub sorting: Vec<String>,
    pub pagination: Option<Page>,
}

impl ListQuery {
    pub fn filtered(filters: BTreeMap<String, Value>) -> Self {
        ListQuery {
            filters,
            ..ListQuery::default()
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Backend hooks behind a [`TransactionScope`].
pub trait TransactionControl {
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

/// Opaque backend lock kept alive for the lifetime of a scope.
trait HeldLock {}
impl<T> HeldLock for T {}

/// A scoped transaction handle: `commit()` consumes it, dropping it without
/// committing rolls back. The default (no backend) scope is a no-op, so
/// repositories without transactional needs behave transparently.
///
/// A backend may hand the scope a lock guard via [`with_lock`]
/// (`TransactionScope::with_lock`); the scope then excludes other threads
/// from the backend until it commits or drops.
#[must_use = "a transaction scope rolls back when dropped without commit"]
pub struct TransactionScope<'a> {
    control: Option<&'a dyn TransactionControl>,
    _lock: Option<Box<dyn HeldLock + 'a>>,
    finished: bool,
}

impl<'a> TransactionScope<'a> {
    /// A scope that commits and rolls back as no-ops.
    pub fn noop() -> Self {
        TransactionScope {
            control: None,
            _lock: None,
            finished: false,
        }
    }

    pub fn new(control: &'a dyn TransactionControl) -> Self {
        TransactionScope {
            control: Some(control),
            _lock: None,
            finished: false,
        }
    }

    /// A scope that additionally holds a backend lock until it finishes.
    pub fn with_lock<L: 'a>(control: &'a dyn TransactionControl, lock: L) -> Self {
        TransactionScope {
            control: Some(control),
            _lock: Some(Box::new(lock)),
            finished: false,
        }
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        match self.control {
            Some(control) => control.commit(),
            None => Ok(()),
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(control) = self.control {
            // Rollback failures in drop have nowhere to surface.
            let _ = control.rollback();
        }
    }
}

// ============================================================================
// ResourceRepository
// ============================================================================

/// The CRUD+query contract a storage binding implements. Entities travel as
/// JSON objects; every operation defaults to a 501 "not implemented" error
/// so partial bindings stay usable.
pub trait ResourceRepository {
    fn create(&self, _data: &Value) -> Result<Value> {
        Err(ApiError::NotImplemented(
            "Creating is not implemented.".to_string(),
        ))
    }

    fn get_detail(&self, _id: &str) -> Result<Value> {
        Err(ApiError::NotImplemented(
            "Getting object is not implemented.".to_string(),
        ))
    }

    fn get_list(&self, _query: &ListQuery) -> Result<Vec<Value>> {
        Err(ApiError::NotImplemented(
            "Getting list is not implemented.".to_string(),
        ))
    }

    fn get_count(&self, _filters: &BTreeMap<String, Value>) -> Result<u64> {
        Err(ApiError::NotImplemented(
            "Counting is not implemented.".to_string(),
        ))
    }

    fn update(&self, _data: &Value) -> Result<Value> {
        Err(ApiError::NotImplemented(
            "Updating is not implemented.".to_string(),
        ))
    }

    fn delete(&self, _id: &str) -> Result<()> {
        Err(ApiError::NotImplemented(
            "Deleting is not implemented.".to_string(),
        ))
    }

    /// Open a transaction scope. The default is a no-op scope.
    fn begin_transaction(&self) -> Result<TransactionScope<'_>> {
        Ok(TransactionScope::noop())
    }
}

// ============================================================================
// Tests
// ============================================================================
