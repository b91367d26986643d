//! Filter schemas: named, inheritable collections of filter fields, and the
//! per-request parse of the `filter[...]` query-string namespace into the
//! normalized filter mapping.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde_json::Value;

use crate::error::{ApiError, ParseError, Result};
use crate::query::params::QueryParams;
use crate::resource::{AttributeResolver, ValueKind};

use super::field::FilterField;

// ============================================================================
// Bracket-path extraction
// ============================================================================

static BRACKET_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn bracket_regex() -> &'static regex::Regex {
    BRACKET_REGEX.get_or_init(|| regex::Regex::new(r"\[(.*?)\]").expect("bracket regex is valid"))
}

/// Extract the bracket-delimited segments of a filter key:
/// `filter[foo][bar]` to `["foo", "bar"]`.
fn bracket_segments(key: &str) -> Vec<&str> {
    bracket_regex()
        .captures_iter(key)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

// ============================================================================
// FilterSchema
// ============================================================================

/// An ordered registry of named filter fields for one resource type.
///
/// Built once at definition time through [`FilterSchemaBuilder`]; immutable
/// afterwards. Duplicate `filter[x]` keys in one query string are not
/// specified behavior - the last occurrence wins.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSchema {
    fields: BTreeMap<String, FilterField>,
}

impl FilterSchema {
    pub fn builder() -> FilterSchemaBuilder {
        FilterSchemaBuilder {
            inherited: BTreeMap::new(),
            plain_fields: Vec::new(),
            declared: BTreeMap::new(),
            resolver: None,
        }
    }

    /// The resolved field table, name to field.
    pub fn base_filters(&self) -> &BTreeMap<String, FilterField> {
        &self.fields
    }

    fn resolve(&self, first_segment: &str) -> Option<(&str, &FilterField)> {
        if let Some((name, field)) = self.fields.get_key_value(first_segment) {
            return Some((name.as_str(), field));
        }
        // A field may also be addressed by its storage attribute override.
        self.fields
            .iter()
            .find(|(_, field)| field.attribute() == Some(first_segment))
            .map(|(name, field)| (name.as_str(), field))
    }

    /// Parse every `filter[...]` key of one request into the normalized
    /// filter mapping (`path__operator` to coerced value).
    ///
    /// Any parse failure surfaces as [`ApiError::InvalidFilters`] naming
    /// the offending `key=value` pair and the cause.
    pub fn parse(&self, params: &QueryParams) -> Result<BTreeMap<String, Value>> {
        let mut result = BTreeMap::new();
        for (key, value) in params.pairs_prefixed("filter") {
            let (normalized_key, parsed) = self
                .parse_one(key, value)
                .map_err(|cause| invalid_filters(key, value, &cause))?;
            result.insert(normalized_key, parsed);
        }
        Ok(result)
    }

    fn parse_one(&self, key: &str, value: &str) -> Result<(String, Value), ParseError> {
        let segments = bracket_segments(key);
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| ParseError::UnknownField(key.to_string()))?;
        let (name, field) = self
            .resolve(first)
            .ok_or_else(|| ParseError::UnknownField((*first).to_string()))?;
        let attribute = field.attribute().unwrap_or(name).to_string();
        field.parse(&[attribute], rest, value)
    }
}

fn invalid_filters(key: &str, value: &str, cause: &ParseError) -> ApiError {
    ApiError::InvalidFilters(format!("Error parsing '{key}={value}': {cause}"))
}

// ============================================================================
// FilterSchemaBuilder
// ============================================================================

/// Folds inherited, synthesized, and explicitly declared fields into one
/// resolved table, keyed by name. Precedence, lowest to highest: inherited
/// base table, fields synthesized from plain attribute names, explicit
/// declarations.
///
/// `build()` panics if any field's default operator is outside its allowed
/// set - a configuration error caught at definition time, not at first
/// parse.
pub struct FilterSchemaBuilder {
    inherited: BTreeMap<String, FilterField>,
    plain_fields: Vec<String>,
    declared: BTreeMap<String, FilterField>,
    resolver: Option<Box<dyn AttributeResolver>>,
}

impl FilterSchemaBuilder {
    /// Inherit a base schema's resolved field table. Transitive: the base
    /// was itself already resolved when built.
    pub fn inherit(mut self, base: &FilterSchema) -> Self {
        for (name, field) in base.base_filters() {
            self.inherited.insert(name.clone(), field.clone());
        }
        self
    }

    /// Declare plain attribute names; each synthesizes a default scalar
    /// field unless an explicit declaration overrides it.
    pub fn fields(mut self, names: &[&str]) -> Self {
        self.plain_fields
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Inject an attribute resolver used to default the value type (and
    /// storage name) of synthesized fields. Without one, synthesized
    /// fields are strings bound to their own name.
    pub fn resolver(mut self, resolver: Box<dyn AttributeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Explicitly declare a field; overrides synthesized and inherited
    /// entries of the same name.
    pub fn field(mut self, name: &str, field: FilterField) -> Self {
        self.declared.insert(name.to_string(), field);
        self
    }

    pub fn build(self) -> FilterSchema {
        let mut fields = self.inherited;
        for name in &self.plain_fields {
            if self.declared.contains_key(name) {
                continue;
            }
            let kind = self
                .resolver
                .as_ref()
                .and_then(|r| r.value_kind(name))
                .unwrap_or(ValueKind::String);
            let mut synthesized = FilterField::new(kind);
            if let Some(storage) = self.resolver.as_ref().and_then(|r| r.storage_name(name)) {
                if storage != name {
                    synthesized = synthesized.with_attribute(storage);
                }
            }
            fields.insert(name.clone(), synthesized);
        }
        for (name, field) in self.declared {
            fields.insert(name, field);
        }
        for (name, field) in &fields {
            field.check_default_operator(name);
        }
        FilterSchema { fields }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::operator::Operator;
    use serde_json::json;

    fn example_schema() -> FilterSchema {
        FilterSchema::builder()
            .fields(&["basic", "integer"])
            .field("listed", FilterField::list(ValueKind::String))
            .field(
                "dumb-name",
                FilterField::new(ValueKind::String).with_attribute("renamed"),
            )
            .field("integer", FilterField::new(ValueKind::Int))
            .build()
    }

    #[test]
    fn construction_is_idempotent() {
        assert_eq!(example_schema(), example_schema());
    }

    #[test]
    fn synthesized_fields_default_to_string() {
        let schema = FilterSchema::builder().fields(&["id", "body"]).build();
        assert_eq!(
            schema.base_filters().get("id"),
            Some(&FilterField::new(ValueKind::String))
        );
        assert_eq!(
            schema.base_filters().get("body"),
            Some(&FilterField::new(ValueKind::String))
        );
    }

    #[test]
    fn explicit_declaration_overrides_plain_field() {
        let schema = FilterSchema::builder()
            .fields(&["id", "body"])
            .field(
                "id",
                FilterField::list(ValueKind::String).with_attribute("identifier"),
            )
            .build();
        assert_eq!(
            schema.base_filters().get("id"),
            Some(&FilterField::list(ValueKind::String).with_attribute("identifier"))
        );
        assert_eq!(
            schema.base_filters().get("body"),
            Some(&FilterField::new(ValueKind::String))
        );
    }

    #[test]
    fn inheritance_merges_with_override_by_name() {
        let base = FilterSchema::builder()
            .fields(&["id", "body"])
            .field("title", FilterField::new(ValueKind::String))
            .build();
        let derived = FilterSchema::builder()
            .inherit(&base)
            .fields(&["id"])
            .field("content", FilterField::new(ValueKind::String))
            .build();

        let names: Vec<&str> = derived.base_filters().keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["body", "content", "id", "title"]);
    }

    #[test]
    fn inheritance_is_transitive() {
        let base = FilterSchema::builder().fields(&["a"]).build();
        let middle = FilterSchema::builder().inherit(&base).fields(&["b"]).build();
        let derived = FilterSchema::builder()
            .inherit(&middle)
            .field("a", FilterField::new(ValueKind::Int))
            .build();

        assert_eq!(
            derived.base_filters().get("a"),
            Some(&FilterField::new(ValueKind::Int))
        );
        assert!(derived.base_filters().contains_key("b"));
    }

    #[test]
    fn parses_full_filter_namespace() {
        let params = QueryParams::parse(
            "/examples/",
            "filter[basic]=text&filter[listed]=first,second&filter[dumb-name]=another&filter[integer]=3",
        );
        let parsed = example_schema().parse(&params).unwrap();
        let expected: BTreeMap<String, Value> = [
            ("basic__eq".to_string(), json!("text")),
            ("listed__in".to_string(), json!(["first", "second"])),
            ("renamed__eq".to_string(), json!("another")),
            ("integer__eq".to_string(), json!(3)),
        ]
        .into();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn unknown_first_segment_is_client_error() {
        let params = QueryParams::parse("/examples/", "filter[mystery]=1");
        let err = example_schema().parse(&params).unwrap_err();
        assert!(matches!(err, ApiError::InvalidFilters(_)));
        assert_eq!(
            err.detail(),
            "Error parsing 'filter[mystery]=1': unknown field 'mystery'"
        );
    }

    #[test]
    fn coercion_failure_cites_key_and_value() {
        let params = QueryParams::parse("/examples/", "filter[integer]=three");
        let err = example_schema().parse(&params).unwrap_err();
        assert_eq!(
            err.detail(),
            "Error parsing 'filter[integer]=three': invalid integer value 'three'"
        );
    }

    #[test]
    fn operator_whitelist_enforced_at_parse() {
        let schema = FilterSchema::builder()
            .field(
                "count",
                FilterField::new(ValueKind::Int).with_operators(&[Operator::Eq]),
            )
            .build();

        let ok = QueryParams::parse("/x/", "filter[count][eq]=2");
        assert_eq!(
            schema.parse(&ok).unwrap().get("count__eq"),
            Some(&json!(2))
        );

        let bad = QueryParams::parse("/x/", "filter[count][gt]=2");
        let err = schema.parse(&bad).unwrap_err();
        assert_eq!(
            err.detail(),
            "Error parsing 'filter[count][gt]=2': forbidden operator 'gt'"
        );
    }

    #[test]
    fn relationship_filter_produces_joined_key() {
        let mut nested = BTreeMap::new();
        nested.insert("attr".to_string(), FilterField::new(ValueKind::String));
        let schema = FilterSchema::builder()
            .field("rel", FilterField::relationship(nested))
            .build();

        let params = QueryParams::parse("/x/", "filter[rel][attr]=v");
        let parsed = schema.parse(&params).unwrap();
        assert_eq!(parsed.get("rel__attr__eq"), Some(&json!("v")));
    }

    #[test]
    fn bare_relationship_filter_rejected() {
        let schema = FilterSchema::builder()
            .field("rel", FilterField::relationship(BTreeMap::new()))
            .build();
        let params = QueryParams::parse("/x/", "filter[rel]=v");
        let err = schema.parse(&params).unwrap_err();
        assert_eq!(
            err.detail(),
            "Error parsing 'filter[rel]=v': filtering directly by relationship is forbidden"
        );
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let params = QueryParams::parse("/x/", "filter[basic]=one&filter[basic]=two");
        let parsed = example_schema().parse(&params).unwrap();
        assert_eq!(parsed.get("basic__eq"), Some(&json!("two")));
    }
}
