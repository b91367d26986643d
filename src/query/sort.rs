//! The `sort` query parameter: comma list of field names, `-` prefix for
//! descending, validated against the resource's declared fields.

use crate::error::{ApiError, Result};
use crate::resource::AttributeResolver;

use super::params::QueryParams;

/// Parse `sort=<field1>,-<field2>,...` into the normalized sort list:
/// storage attribute names in order of appearance, `-` prefix preserved.
///
/// Unknown fields and relationship-typed fields are rejected with
/// [`ApiError::InvalidSort`]. Absent parameter yields an empty list.
pub fn parse_sort(params: &QueryParams, resolver: &dyn AttributeResolver) -> Result<Vec<String>> {
    let raw = match params.get("sort") {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(Vec::new()),
    };

    let mut sorting = Vec::new();
    for entry in raw.split(',') {
        let (descending, name) = match entry.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, entry),
        };
        if resolver.is_relationship(name) {
            return Err(ApiError::InvalidSort(format!(
                "You can't sort on relationship '{name}'."
            )));
        }
        let storage = resolver
            .storage_name(name)
            .ok_or_else(|| ApiError::InvalidSort(format!("Unknown sort field '{name}'.")))?;
        if descending {
            sorting.push(format!("-{storage}"));
        } else {
            sorting.push(storage.to_string());
        }
    }
    Ok(sorting)
}
