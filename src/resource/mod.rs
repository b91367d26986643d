//! Resource metadata: attribute/relationship declarations for one resource
//! type, the attribute-resolution capability the parsers depend on, and the
//! entity graph the translation engine walks.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::ParseError;

// ============================================================================
// Identifier validation
// ============================================================================

static IDENT_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn ident_regex() -> &'static regex::Regex {
    IDENT_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("ident regex is valid")
    })
}

/// Storage identifiers (tables, columns) are interpolated into SQL, so they
/// must be plain identifiers. Public field names are free-form.
fn validate_ident(kind: &str, name: &str) {
    assert!(
        ident_regex().is_match(name),
        "invalid {kind} name {name:?}: must match [a-zA-Z_][a-zA-Z0-9_]*"
    );
}

// ============================================================================
// ValueKind
// ============================================================================

/// Type tag for filter value coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int,
    Float,
    Bool,
}

impl ValueKind {
    /// Coerce one raw query-string value into a typed JSON value.
    pub fn parse(self, raw: &str) -> Result<Value, ParseError> {
        match self {
            ValueKind::String => Ok(Value::String(raw.to_string())),
            ValueKind::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ParseError::InvalidValue {
                    kind: "integer",
                    raw: raw.to_string(),
                }),
            ValueKind::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| ParseError::InvalidValue {
                    kind: "float",
                    raw: raw.to_string(),
                }),
            ValueKind::Bool => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(ParseError::InvalidValue {
                    kind: "boolean",
                    raw: raw.to_string(),
                }),
            },
        }
    }
}

// ============================================================================
// Attribute / relationship definitions
// ============================================================================

/// One scalar attribute: public name, backing column, value type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub public_name: String,
    pub storage_name: String,
    pub kind: ValueKind,
}

/// One relationship: joins `<this>.<local_column>` to
/// `<target>.<target_column>`. Covers both belongs-to (`author_id` to `id`)
/// and has-many (`id` to `article_id`) shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDef {
    pub name: String,
    pub target: String,
    pub local_column: String,
    pub target_column: String,
}

// ============================================================================
// ResourceDef
// ============================================================================

/// Declared metadata for one resource type: its JSON:API type name, backing
/// table, attributes, and relationships. Built once, shared via `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDef {
    pub type_name: String,
    pub table: String,
    attributes: BTreeMap<String, AttributeDef>,
    relationships: BTreeMap<String, RelationshipDef>,
}

impl ResourceDef {
    pub fn builder(type_name: &str, table: &str) -> ResourceDefBuilder {
        validate_ident("table", table);
        ResourceDefBuilder {
            type_name: type_name.to_string(),
            table: table.to_string(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, public_name: &str) -> Option<&AttributeDef> {
        self.attributes.get(public_name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDef> {
        self.relationships.values()
    }

    /// Whether `name` is a storage column on this entity's table.
    ///
    /// Columns are the implicit `id`, every attribute's storage name, and
    /// every relationship's local join column.
    pub fn has_column(&self, name: &str) -> bool {
        name == "id"
            || self.attributes.values().any(|a| a.storage_name == name)
            || self.relationships.values().any(|r| r.local_column == name)
    }

    /// All storage columns, `id` first, in declaration order.
    pub fn columns(&self) -> Vec<(&str, Option<ValueKind>)> {
        let mut cols: Vec<(&str, Option<ValueKind>)> = vec![("id", Some(ValueKind::Int))];
        for attr in self.attributes.values() {
            if attr.storage_name != "id" {
                cols.push((&attr.storage_name, Some(attr.kind)));
            }
        }
        for rel in self.relationships.values() {
            let col = rel.local_column.as_str();
            if col != "id" && cols.iter().all(|(c, _)| *c != col) {
                cols.push((col, Some(ValueKind::Int)));
            }
        }
        cols
    }
}

// ============================================================================
// AttributeResolver
// ============================================================================

/// Capability boundary: given a resource's public field name, return its
/// storage attribute name and value type. The filter/sort parsers depend on
/// this trait only, never on concrete schema internals.
pub trait AttributeResolver {
    fn storage_name(&self, field: &str) -> Option<&str>;
    fn value_kind(&self, field: &str) -> Option<ValueKind>;
    fn is_relationship(&self, field: &str) -> bool;
}

impl<T: AttributeResolver + ?Sized> AttributeResolver for Arc<T> {
    fn storage_name(&self, field: &str) -> Option<&str> {
        (**self).storage_name(field)
    }

    fn value_kind(&self, field: &str) -> Option<ValueKind> {
        (**self).value_kind(field)
    }

    fn is_relationship(&self, field: &str) -> bool {
        (**self).is_relationship(field)
    }
}

impl AttributeResolver for ResourceDef {
    fn storage_name(&self, field: &str) -> Option<&str> {
        self.attributes
            .get(field)
            .map(|a| a.storage_name.as_str())
            .or_else(|| self.relationships.get(field).map(|r| r.name.as_str()))
    }

    fn value_kind(&self, field: &str) -> Option<ValueKind> {
        self.attributes.get(field).map(|a| a.kind)
    }

    fn is_relationship(&self, field: &str) -> bool {
        self.relationships.contains_key(field)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent builder for [`ResourceDef`]. Panics on invalid storage
/// identifiers or duplicate names: resource declarations are programming
/// configuration and fail fast.
pub struct ResourceDefBuilder {
    type_name: String,
    table: String,
    attributes: BTreeMap<String, AttributeDef>,
    relationships: BTreeMap<String, RelationshipDef>,
}

impl ResourceDefBuilder {
    /// Declare an attribute whose storage column matches its public name.
    pub fn attr(self, name: &str, kind: ValueKind) -> Self {
        let storage = name.to_string();
        self.attr_as(name, &storage, kind)
    }

    /// Declare an attribute with a public name distinct from its column.
    pub fn attr_as(mut self, public_name: &str, storage_name: &str, kind: ValueKind) -> Self {
        validate_ident("column", storage_name);
        let prev = self.attributes.insert(
            public_name.to_string(),
            AttributeDef {
                public_name: public_name.to_string(),
                storage_name: storage_name.to_string(),
                kind,
            },
        );
        assert!(prev.is_none(), "duplicate attribute {public_name:?}");
        self
    }

    /// Declare a relationship joining `local_column` to
    /// `<target>.<target_column>`.
    pub fn relationship(
        mut self,
        name: &str,
        target: &str,
        local_column: &str,
        target_column: &str,
    ) -> Self {
        validate_ident("relationship", name);
        validate_ident("column", local_column);
        validate_ident("column", target_column);
        let prev = self.relationships.insert(
            name.to_string(),
            RelationshipDef {
                name: name.to_string(),
                target: target.to_string(),
                local_column: local_column.to_string(),
                target_column: target_column.to_string(),
            },
        );
        assert!(prev.is_none(), "duplicate relationship {name:?}");
        self
    }

    pub fn build(self) -> Arc<ResourceDef> {
        Arc::new(ResourceDef {
            type_name: self.type_name,
            table: self.table,
            attributes: self.attributes,
            relationships: self.relationships,
        })
    }
}

// ============================================================================
// EntityGraph
// ============================================================================

/// The object-relational mapping graph the translation engine walks:
/// entity name to resource definition.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    entities: BTreeMap<String, Arc<ResourceDef>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, def: Arc<ResourceDef>) -> Self {
        self.entities.insert(def.type_name.clone(), def);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<ResourceDef>> {
        self.entities.get(type_name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<ResourceDef>> {
        self.entities.values()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_kind_coercion() {
        assert_eq!(ValueKind::String.parse("3").unwrap(), json!("3"));
        assert_eq!(ValueKind::Int.parse("3").unwrap(), json!(3));
        assert_eq!(ValueKind::Float.parse("1.5").unwrap(), json!(1.5));
        assert_eq!(ValueKind::Bool.parse("true").unwrap(), json!(true));
        assert!(ValueKind::Int.parse("three").is_err());
        assert!(ValueKind::Bool.parse("yes").is_err());
    }

    #[test]
    fn resolver_translates_public_names() {
        let def = ResourceDef::builder("examples", "examples")
            .attr_as("dumb-name", "renamed", ValueKind::String)
            .attr("basic", ValueKind::String)
            .build();
        assert_eq!(def.storage_name("dumb-name"), Some("renamed"));
        assert_eq!(def.storage_name("basic"), Some("basic"));
        assert_eq!(def.storage_name("missing"), None);
        assert_eq!(def.value_kind("basic"), Some(ValueKind::String));
    }

    #[test]
    fn columns_include_id_and_relationship_keys() {
        let def = ResourceDef::builder("articles", "articles")
            .attr("title", ValueKind::String)
            .relationship("author", "people", "author_id", "id")
            .build();
        assert!(def.has_column("id"));
        assert!(def.has_column("title"));
        assert!(def.has_column("author_id"));
        assert!(!def.has_column("author"));
    }

    #[test]
    #[should_panic(expected = "invalid column name")]
    fn builder_rejects_unsafe_storage_names() {
        let _ = ResourceDef::builder("articles", "articles").attr("a; DROP TABLE", ValueKind::String);
    }

    #[test]
    fn graph_lookup() {
        let people = ResourceDef::builder("people", "people")
            .attr("name", ValueKind::String)
            .build();
        let graph = EntityGraph::new().register(people.clone());
        assert_eq!(graph.get("people"), Some(&people));
        assert!(graph.get("articles").is_none());
    }
}
