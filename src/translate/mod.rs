//! The query translation engine: resolves `__`-delimited attribute paths
//! across relationship joins and builds an executable query plan.
//!
//! A filter key `a__b__c__op` means: follow relationship `a`, then
//! relationship `b`, then compare column `c` using operator `op`. Joins are
//! recorded lazily and deduplicated per distinct join path within one plan,
//! so two filters through the same relationship share one join.

pub mod sql;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::error::QueryError;
use crate::filter::operator::Operator;
use crate::query::page::Page;
use crate::resource::{EntityGraph, ResourceDef};

/// Alias of the root entity's table in the generated query.
pub const ROOT_ALIAS: &str = "t0";

// ============================================================================
// Plan types
// ============================================================================

/// One relationship join, applied exactly once per distinct path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Relationship path from the root, e.g. `author` or `author__team`.
    pub path: String,
    pub table: String,
    pub alias: String,
    pub left_alias: String,
    pub left_column: String,
    pub right_column: String,
}

/// One comparison between a resolved column and a filter value.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub table_alias: String,
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

/// One resolved sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub table_alias: String,
    pub column: String,
    pub descending: bool,
}

/// An executable query: joins (deduplicated), predicates (implicit AND),
/// sort keys in priority order, and the pagination window.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub table: String,
    pub joins: Vec<Join>,
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

// ============================================================================
// Path resolution
// ============================================================================

/// Join bookkeeping shared by every filter and sort entry of one plan.
struct PlanState<'g> {
    graph: &'g EntityGraph,
    joins: Vec<Join>,
}

impl<'g> PlanState<'g> {
    /// Record a join for `rel` under `path`, or reuse the one already
    /// recorded for the same path. Returns the joined entity and its alias.
    ///
    /// Panics if the relationship targets an entity missing from the graph:
    /// that is a resource declaration error, not client input.
    fn join(
        &mut self,
        rel_path: &str,
        left_alias: &str,
        left_column: &str,
        right_column: &str,
        target: &str,
    ) -> (Arc<ResourceDef>, String) {
        let entity = self.graph.get(target).cloned().unwrap_or_else(|| {
            panic!("relationship target {target:?} is not registered in the entity graph")
        });
        if let Some(join) = self.joins.iter().find(|j| j.path == rel_path) {
            return (entity, join.alias.clone());
        }
        let alias = format!("t{}", self.joins.len() + 1);
        self.joins.push(Join {
            path: rel_path.to_string(),
            table: entity.table.clone(),
            alias: alias.clone(),
            left_alias: left_alias.to_string(),
            left_column: left_column.to_string(),
            right_column: right_column.to_string(),
        });
        (entity, alias)
    }
}

/// A resolved path: the final column, where it lives, and the trailing
/// operator if the path carried one.
struct ResolvedPath {
    alias: String,
    column: String,
    operator: Option<Operator>,
}

/// Walk the `__`-delimited tokens of `path` left to right against the
/// entity metadata, recording pending joins as relationships resolve.
///
/// With `allow_operator`, a token following the resolved column must be a
/// known operator and must be last. Any token that resolves as neither a
/// relationship, a column, nor an operator fails with
/// [`QueryError::UnresolvedToken`] naming the token and the full path.
fn resolve_path(
    state: &mut PlanState<'_>,
    root: &Arc<ResourceDef>,
    path: &str,
    allow_operator: bool,
) -> Result<ResolvedPath, QueryError> {
    let tokens: Vec<&str> = path.split("__").collect();
    let mut current = root.clone();
    let mut alias = ROOT_ALIAS.to_string();
    let mut rel_path = String::new();
    let mut column: Option<String> = None;
    let mut operator: Option<Operator> = None;
    let mut last_relationship: Option<String> = None;

    for (index, token) in tokens.iter().enumerate() {
        let unresolved = || QueryError::UnresolvedToken {
            token: (*token).to_string(),
            path: path.to_string(),
        };

        match column {
            None => {
                if let Some(rel) = current.relationship(token).cloned() {
                    if !rel_path.is_empty() {
                        rel_path.push_str("__");
                    }
                    rel_path.push_str(token);
                    let (entity, next_alias) = state.join(
                        &rel_path,
                        &alias,
                        &rel.local_column,
                        &rel.target_column,
                        &rel.target,
                    );
                    current = entity;
                    alias = next_alias;
                    last_relationship = Some((*token).to_string());
                } else if current.has_column(token) {
                    column = Some((*token).to_string());
                } else {
                    return Err(unresolved());
                }
            }
            Some(_) => {
                // Column already resolved: only a trailing operator is legal.
                if !allow_operator || index != tokens.len() - 1 {
                    return Err(unresolved());
                }
                operator = Some(Operator::from_str(token).map_err(|_| unresolved())?);
            }
        }
    }

    match column {
        Some(column) => Ok(ResolvedPath {
            alias,
            column,
            operator,
        }),
        None => Err(QueryError::FilterOnRelationship(
            last_relationship.unwrap_or_else(|| path.to_string()),
        )),
    }
}

// ============================================================================
// Operand validation
// ============================================================================

/// Shape-check a filter value against its operator. List-valued operators
/// take the whole value as a sequence (a scalar is lifted to a singleton);
/// `range` requires exactly two bounds.
fn check_operand(operator: Operator, value: Value) -> Result<Value, QueryError> {
    if !operator.is_list_valued() {
        return Ok(value);
    }
    let items = match value {
        Value::Array(items) => items,
        scalar => vec![scalar],
    };
    if operator == Operator::Range && items.len() != 2 {
        return Err(QueryError::InvalidOperand {
            operator: operator.as_str(),
            expected: "exactly two values",
            got: format!("{} value(s)", items.len()),
        });
    }
    Ok(Value::Array(items))
}

// ============================================================================
// Plan building
// ============================================================================

/// Translate one `get_list` call's normalized inputs into a query plan.
///
/// Filter predicates combine with implicit AND; joins recorded across all
/// entries are deduplicated and applied once; sort keys keep their given
/// left-to-right priority; `offset = size * (number - 1)`.
pub fn build_plan(
    graph: &EntityGraph,
    root: &Arc<ResourceDef>,
    filters: &BTreeMap<String, Value>,
    sorting: &[String],
    pagination: Option<Page>,
) -> Result<QueryPlan, QueryError> {
    let mut state = PlanState {
        graph,
        joins: Vec::new(),
    };

    let mut predicates = Vec::new();
    for (key, value) in filters {
        let resolved = resolve_path(&mut state, root, key, true)?;
        // A walk that exhausts its tokens without an operator means equality.
        let operator = resolved.operator.unwrap_or(Operator::Eq);
        predicates.push(Predicate {
            table_alias: resolved.alias,
            column: resolved.column,
            operator,
            value: check_operand(operator, value.clone())?,
        });
    }

    let mut order = Vec::new();
    for entry in sorting {
        let (descending, path) = match entry.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, entry.as_str()),
        };
        let resolved = resolve_path(&mut state, root, path, false).map_err(|e| match e {
            QueryError::FilterOnRelationship(rel) => QueryError::SortOnRelationship(rel),
            other => other,
        })?;
        order.push(OrderBy {
            table_alias: resolved.alias,
            column: resolved.column,
            descending,
        });
    }

    // parse_page guarantees size >= 1 and number >= 1; saturate anyway so a
    // hand-built Page cannot underflow or overflow the window arithmetic.
    let (limit, offset) = match pagination {
        Some(page) => (
            Some(page.size),
            Some(page.size.saturating_mul(page.number.saturating_sub(1))),
        ),
        None => (None, None),
    };

    Ok(QueryPlan {
        table: root.table.clone(),
        joins: state.joins,
        predicates,
        order,
        limit,
        offset,
    })
}

// ============================================================================
// Tests
// ============================================================================
