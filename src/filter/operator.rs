//! The fixed registry of comparison operators a filter key may carry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Operator
// ============================================================================

/// A named comparison applied between a resolved storage attribute and a
/// filter value.
///
/// The `i`-prefixed variants are case-insensitive. `In`, `NotIn`, and
/// `Range` take a list value; everything else takes a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NotContains,
    In,
    NotIn,
    Exact,
    Iexact,
    Startswith,
    Istartswith,
    Endswith,
    Iendswith,
    Isnull,
    Range,
    Year,
    Month,
    Day,
}

/// All operators, in declaration order.
pub const ALL_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ne,
    Operator::Gt,
    Operator::Lt,
    Operator::Gte,
    Operator::Lte,
    Operator::Contains,
    Operator::NotContains,
    Operator::In,
    Operator::NotIn,
    Operator::Exact,
    Operator::Iexact,
    Operator::Startswith,
    Operator::Istartswith,
    Operator::Endswith,
    Operator::Iendswith,
    Operator::Isnull,
    Operator::Range,
    Operator::Year,
    Operator::Month,
    Operator::Day,
];

impl Operator {
    /// The lowercase token used in query strings and normalized filter keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::NotContains => "notcontains",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Exact => "exact",
            Operator::Iexact => "iexact",
            Operator::Startswith => "startswith",
            Operator::Istartswith => "istartswith",
            Operator::Endswith => "endswith",
            Operator::Iendswith => "iendswith",
            Operator::Isnull => "isnull",
            Operator::Range => "range",
            Operator::Year => "year",
            Operator::Month => "month",
            Operator::Day => "day",
        }
    }

    /// Whether the operator takes the whole filter value as a sequence.
    pub fn is_list_valued(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::Range)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_OPERATORS
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or(())
    }
}

// ============================================================================
// Tests
// ============================================================================
