//! Rendering a [`QueryPlan`](super::QueryPlan) into SQLite SQL and
//! positional parameters.
//!
//! Table and column names come from validated resource definitions, so they
//! are interpolated directly; every filter value travels as a bound
//! parameter.

use serde_json::Value;

use crate::filter::operator::Operator;

use super::{Predicate, QueryPlan, ROOT_ALIAS};

// ============================================================================
// Value conversion
// ============================================================================

/// Convert a JSON filter value to a `rusqlite` parameter value.
pub fn json_value_to_sql(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        // Arrays and objects stored as JSON strings in SQLite
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

/// The truthiness rule for `isnull` values: `false`, `0`, `"false"`, `"0"`,
/// `""`, and `null` read as false.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !matches!(s.as_str(), "" | "false" | "0"),
        _ => true,
    }
}

// ============================================================================
// Predicate rendering
// ============================================================================

/// Render one predicate as a SQL fragment, pushing its parameters.
fn render_predicate(p: &Predicate, params: &mut Vec<rusqlite::types::Value>) -> String {
    let col = format!("{}.{}", p.table_alias, p.column);
    let mut push = |v: &Value| params.push(json_value_to_sql(v));

    match p.operator {
        Operator::Eq | Operator::Exact => {
            push(&p.value);
            format!("{col} = ?")
        }
        Operator::Ne => {
            push(&p.value);
            format!("{col} <> ?")
        }
        Operator::Gt => {
            push(&p.value);
            format!("{col} > ?")
        }
        Operator::Lt => {
            push(&p.value);
            format!("{col} < ?")
        }
        Operator::Gte => {
            push(&p.value);
            format!("{col} >= ?")
        }
        Operator::Lte => {
            push(&p.value);
            format!("{col} <= ?")
        }
        Operator::Contains => {
            push(&p.value);
            format!("{col} LIKE '%' || ? || '%'")
        }
        Operator::NotContains => {
            push(&p.value);
            format!("{col} NOT LIKE '%' || ? || '%'")
        }
        Operator::Iexact => {
            push(&p.value);
            format!("LOWER({col}) = LOWER(?)")
        }
        Operator::Startswith => {
            push(&p.value);
            format!("{col} LIKE ? || '%'")
        }
        Operator::Istartswith => {
            push(&p.value);
            format!("LOWER({col}) LIKE LOWER(?) || '%'")
        }
        Operator::Endswith => {
            push(&p.value);
            format!("{col} LIKE '%' || ?")
        }
        Operator::Iendswith => {
            push(&p.value);
            format!("LOWER({col}) LIKE '%' || LOWER(?)")
        }
        Operator::Isnull => {
            if is_truthy(&p.value) {
                format!("{col} IS NULL")
            } else {
                format!("{col} IS NOT NULL")
            }
        }
        Operator::In | Operator::NotIn => {
            let items = p.value.as_array().cloned().unwrap_or_default();
            if items.is_empty() {
                // IN () is a syntax error; an empty list matches nothing.
                return if p.operator == Operator::In {
                    "1 = 0".to_string()
                } else {
                    "1 = 1".to_string()
                };
            }
            let placeholders = vec!["?"; items.len()].join(", ");
            for item in &items {
                push(item);
            }
            if p.operator == Operator::In {
                format!("{col} IN ({placeholders})")
            } else {
                format!("{col} NOT IN ({placeholders})")
            }
        }
        Operator::Range => {
            let items = p.value.as_array().cloned().unwrap_or_default();
            for item in &items {
                push(item);
            }
            format!("{col} BETWEEN ? AND ?")
        }
        Operator::Year => {
            push(&p.value);
            format!("CAST(strftime('%Y', {col}) AS INTEGER) = ?")
        }
        Operator::Month => {
            push(&p.value);
            format!("CAST(strftime('%m', {col}) AS INTEGER) = ?")
        }
        Operator::Day => {
            push(&p.value);
            format!("CAST(strftime('%d', {col}) AS INTEGER) = ?")
        }
    }
}

// ============================================================================
// Statement rendering
// ============================================================================

fn render_from_where(
    plan: &QueryPlan,
    params: &mut Vec<rusqlite::types::Value>,
) -> String {
    let mut sql = format!("FROM {} {ROOT_ALIAS}", plan.table);
    for join in &plan.joins {
        sql.push_str(&format!(
            " JOIN {} {} ON {}.{} = {}.{}",
            join.table, join.alias, join.left_alias, join.left_column, join.alias,
            join.right_column
        ));
    }
    if !plan.predicates.is_empty() {
        let fragments: Vec<String> = plan
            .predicates
            .iter()
            .map(|p| render_predicate(p, params))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&fragments.join(" AND "));
    }
    sql
}

/// Render the full row-returning statement.
pub fn render_select(plan: &QueryPlan) -> (String, Vec<rusqlite::types::Value>) {
    let mut params = Vec::new();
    let mut sql = format!("SELECT {ROOT_ALIAS}.* ");
    sql.push_str(&render_from_where(plan, &mut params));

    if !plan.order.is_empty() {
        let keys: Vec<String> = plan
            .order
            .iter()
            .map(|o| {
                format!(
                    "{}.{} {}",
                    o.table_alias,
                    o.column,
                    if o.descending { "DESC" } else { "ASC" }
                )
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = plan.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    (sql, params)
}

/// Render the count statement: same joins and predicates, no ordering or
/// pagination.
pub fn render_count(plan: &QueryPlan) -> (String, Vec<rusqlite::types::Value>) {
    let mut params = Vec::new();
    let mut sql = "SELECT COUNT(*) ".to_string();
    sql.push_str(&render_from_where(plan, &mut params));
    (sql, params)
}

// ============================================================================
// Tests
// ============================================================================
