//! Declarative filter fields: how one query-string filter attribute parses
//! into a typed, operator-qualified entry of the normalized filter mapping.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::ParseError;
use crate::resource::ValueKind;

use super::operator::{Operator, ALL_OPERATORS};

// ============================================================================
// Field shape
// ============================================================================

/// What kind of value a field parses.
#[derive(Debug, Clone, PartialEq)]
enum FieldShape {
    /// One coerced value.
    Scalar,
    /// Comma-split sequence, each part coerced independently.
    List,
    /// Recurses into another field set; carries no value of its own.
    Relationship(BTreeMap<String, FilterField>),
}

// ============================================================================
// FilterField
// ============================================================================

/// A declarative unit describing how to parse one filter attribute: its
/// storage attribute override, value type, operator whitelist, and default
/// operator. Immutable once constructed; equality is value semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterField {
    attribute: Option<String>,
    kind: ValueKind,
    operators: BTreeSet<Operator>,
    default_operator: Operator,
    shape: FieldShape,
}

impl FilterField {
    /// A scalar field allowing every operator, defaulting to `eq`.
    pub fn new(kind: ValueKind) -> Self {
        FilterField {
            attribute: None,
            kind,
            operators: ALL_OPERATORS.iter().copied().collect(),
            default_operator: Operator::Eq,
            shape: FieldShape::Scalar,
        }
    }

    /// A list-valued field: the raw value splits on `,` and the implicit
    /// default operator is `in`.
    pub fn list(kind: ValueKind) -> Self {
        FilterField {
            default_operator: Operator::In,
            shape: FieldShape::List,
            ..FilterField::new(kind)
        }
    }

    /// A relationship field recursing into the target schema's field set.
    pub fn relationship(fields: BTreeMap<String, FilterField>) -> Self {
        FilterField {
            shape: FieldShape::Relationship(fields),
            ..FilterField::new(ValueKind::String)
        }
    }

    /// Override the storage attribute name this field binds to.
    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    /// Restrict the allowed operator set.
    pub fn with_operators(mut self, operators: &[Operator]) -> Self {
        self.operators = operators.iter().copied().collect();
        self
    }

    /// Change the operator used when the filter key carries none.
    pub fn with_default_operator(mut self, operator: Operator) -> Self {
        self.default_operator = operator;
        self
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn default_operator(&self) -> Operator {
        self.default_operator
    }

    pub fn allows(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }

    /// Configuration check run when the owning schema is built: the default
    /// operator must belong to the allowed set.
    pub(crate) fn check_default_operator(&self, name: &str) {
        assert!(
            self.operators.contains(&self.default_operator),
            "filter field {name:?}: default operator '{}' is not in the allowed set",
            self.default_operator
        );
        if let FieldShape::Relationship(nested) = &self.shape {
            for (nested_name, field) in nested {
                field.check_default_operator(nested_name);
            }
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Parse one filter entry into its normalized `(key, value)` form.
    ///
    /// `processed_path` holds the storage attribute segments resolved so
    /// far; `remaining` holds the bracket segments not yet consumed (at
    /// most one trailing operator for scalar/list fields). The output key
    /// joins the path with `__` and always carries the operator suffix.
    pub fn parse(
        &self,
        processed_path: &[String],
        remaining: &[&str],
        raw_value: &str,
    ) -> Result<(String, Value), ParseError> {
        match &self.shape {
            FieldShape::Relationship(nested) => {
                let (first, rest) = remaining
                    .split_first()
                    .ok_or(ParseError::BareRelationship)?;
                let field = nested
                    .get(*first)
                    .ok_or_else(|| ParseError::UnknownField((*first).to_string()))?;
                let mut path = processed_path.to_vec();
                path.push(field.attribute().unwrap_or(first).to_string());
                field.parse(&path, rest, raw_value)
            }
            FieldShape::Scalar | FieldShape::List => {
                if remaining.len() > 1 {
                    return Err(ParseError::TrailingSegments);
                }
                let operator = match remaining.first() {
                    Some(token) => {
                        let op: Operator = token
                            .parse()
                            .map_err(|_| ParseError::ForbiddenOperator((*token).to_string()))?;
                        if !self.operators.contains(&op) {
                            return Err(ParseError::ForbiddenOperator((*token).to_string()));
                        }
                        op
                    }
                    None => self.default_operator,
                };
                let value = self.parse_value(raw_value)?;
                let key = format!("{}__{}", processed_path.join("__"), operator);
                Ok((key, value))
            }
        }
    }

    fn parse_value(&self, raw: &str) -> Result<Value, ParseError> {
        match self.shape {
            FieldShape::List => {
                let parts = raw
                    .split(',')
                    .map(|part| self.kind.parse(part))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(parts))
            }
            _ => self.kind.parse(raw),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
