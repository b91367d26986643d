//! The `include` query parameter: requested relationship expansions.

use crate::error::{ApiError, Result};
use crate::resource::{EntityGraph, ResourceDef};

use super::params::QueryParams;

/// Parse `include=<rel1>,<rel2.sub>,...` into the validated include list.
///
/// Each dotted path component must name a relationship, walked across the
/// entity graph from `root`; anything else is [`ApiError::InvalidInclude`].
/// Absent or empty yields an empty list.
pub fn parse_include(
    params: &QueryParams,
    root: &ResourceDef,
    graph: &EntityGraph,
) -> Result<Vec<String>> {
    let raw = match params.get("include") {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(Vec::new()),
    };

    let mut includes = Vec::new();
    for path in raw.split(',') {
        let mut current = root;
        for component in path.split('.') {
            let rel = current.relationship(component).ok_or_else(|| {
                ApiError::InvalidInclude(format!(
                    "'{component}' is not a relationship of '{}'.",
                    current.type_name
                ))
            })?;
            // A dangling target is a resource declaration error, not input.
            current = graph.get(&rel.target).unwrap_or_else(|| {
                panic!(
                    "relationship target {:?} is not registered in the entity graph",
                    rel.target
                )
            });
        }
        includes.push(path.to_string());
    }
    Ok(includes)
}
