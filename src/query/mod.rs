//! Query-string parsers: each reads one query-parameter namespace and
//! produces a normalized structure, validating against the resource's
//! declared metadata.

pub mod fields;
pub mod include;
pub mod page;
pub mod params;
pub mod sort;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;
use crate::filter::schema::FilterSchema;
use crate::resource::{EntityGraph, ResourceDef};

pub use fields::parse_sparse_fields;
pub use include::parse_include;
pub use page::{page_links, parse_page, Page, PageLinks};
pub use params::QueryParams;
pub use sort::parse_sort;

/// Everything one list request asked for, parsed and validated.
#[derive(Debug, Clone)]
pub struct RequestQuery {
    pub filters: BTreeMap<String, Value>,
    pub sorting: Vec<String>,
    pub pagination: Option<Page>,
    pub include: Vec<String>,
    /// `None` means no restriction, distinct from an empty restriction.
    pub sparse_fields: Option<Vec<String>>,
}

/// Run all five parsers against one request's query string.
pub fn parse_request(
    params: &QueryParams,
    filter_schema: &FilterSchema,
    root: &ResourceDef,
    graph: &EntityGraph,
) -> Result<RequestQuery> {
    Ok(RequestQuery {
        filters: filter_schema.parse(params)?,
        sorting: parse_sort(params, root)?,
        pagination: parse_page(params)?,
        include: parse_include(params, root, graph)?,
        sparse_fields: parse_sparse_fields(params, &root.type_name)?,
    })
}
