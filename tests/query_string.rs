//! End-to-end query-string parsing: sort, page, sparse fields, include, and
//! the combined request parse with pagination links.

use jsonapi_query::error::ApiError;
use jsonapi_query::filter::FilterSchema;
use jsonapi_query::query::{
    page_links, parse_include, parse_page, parse_request, parse_sort, parse_sparse_fields,
    QueryParams,
};
use jsonapi_query::resource::{EntityGraph, ResourceDef, ValueKind};
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Test helpers
// ============================================================================

fn graph() -> (Arc<ResourceDef>, EntityGraph) {
    let teams = ResourceDef::builder("teams", "teams")
        .attr("name", ValueKind::String)
        .build();
    let people = ResourceDef::builder("people", "people")
        .attr("name", ValueKind::String)
        .relationship("team", "teams", "team_id", "id")
        .build();
    let articles = ResourceDef::builder("articles", "articles")
        .attr("title", ValueKind::String)
        .attr_as("dumb-name", "renamed", ValueKind::String)
        .relationship("author", "people", "author_id", "id")
        .build();
    let graph = EntityGraph::new()
        .register(teams)
        .register(people)
        .register(articles.clone());
    (articles, graph)
}

fn params(query: &str) -> QueryParams {
    QueryParams::parse("/articles/", query)
}

// ============================================================================
// Sort
// ============================================================================

#[test]
fn sort_translates_names_and_keeps_direction() {
    let (articles, _) = graph();
    let sorting = parse_sort(&params("sort=-title,dumb-name"), articles.as_ref()).unwrap();
    assert_eq!(sorting, vec!["-title", "renamed"]);
}

#[test]
fn sort_absent_is_empty() {
    let (articles, _) = graph();
    assert!(parse_sort(&params(""), articles.as_ref()).unwrap().is_empty());
}

#[test]
fn sort_by_relationship_rejected() {
    let (articles, _) = graph();
    let err = parse_sort(&params("sort=author"), articles.as_ref()).unwrap_err();
    assert!(matches!(err, ApiError::InvalidSort(_)));
    assert_eq!(err.source_parameter(), Some("sort"));
}

#[test]
fn sort_by_unknown_field_rejected() {
    let (articles, _) = graph();
    let err = parse_sort(&params("sort=bogus"), articles.as_ref()).unwrap_err();
    assert!(matches!(err, ApiError::InvalidSort(_)));
}

// ============================================================================
// Sparse fields
// ============================================================================

#[test]
fn sparse_fields_for_primary_type() {
    let fields =
        parse_sparse_fields(&params("fields[articles]=title,author"), "articles").unwrap();
    assert_eq!(fields, Some(vec!["title".to_string(), "author".to_string()]));
}

#[test]
fn sparse_fields_absent_means_unrestricted() {
    assert_eq!(parse_sparse_fields(&params(""), "articles").unwrap(), None);
}

#[test]
fn sparse_fields_empty_value_restricts_to_nothing() {
    let fields = parse_sparse_fields(&params("fields[articles]="), "articles").unwrap();
    assert_eq!(fields, Some(vec![]));
}

#[test]
fn sparse_fields_other_types_prefixed() {
    let fields = parse_sparse_fields(&params("fields[people]=name"), "articles").unwrap();
    assert_eq!(fields, Some(vec!["people.name".to_string()]));
}

#[test]
fn malformed_fields_key_rejected() {
    let err = parse_sparse_fields(&params("fields=title"), "articles").unwrap_err();
    assert!(matches!(err, ApiError::InvalidField(_)));
}

// ============================================================================
// Page
// ============================================================================

#[test]
fn zero_page_parameters_rejected() {
    for raw in ["page[size]=10&page[number]=0", "page[size]=0&page[number]=1"] {
        let err = parse_page(&params(raw)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidPage(_)), "raw: {raw}");
        assert_eq!(err.detail(), "Page parameters must be positive integers.");
    }
}

// ============================================================================
// Include
// ============================================================================

#[test]
fn include_walks_dotted_relationship_paths() {
    let (articles, graph) = graph();
    let include =
        parse_include(&params("include=author,author.team"), &articles, &graph).unwrap();
    assert_eq!(include, vec!["author", "author.team"]);
}

#[test]
fn include_unknown_relationship_rejected() {
    let (articles, graph) = graph();
    let err = parse_include(&params("include=title"), &articles, &graph).unwrap_err();
    assert!(matches!(err, ApiError::InvalidInclude(_)));
    assert_eq!(err.source_parameter(), Some("include"));
}

// ============================================================================
// Combined request
// ============================================================================

#[test]
fn full_request_parses_every_namespace() {
    let (articles, graph) = graph();
    let schema = FilterSchema::builder()
        .resolver(Box::new(articles.clone()))
        .fields(&["title"])
        .build();
    let request = parse_request(
        &params("filter[title]=x&sort=-title&page[size]=10&page[number]=2&include=author&fields[articles]=title"),
        &schema,
        &articles,
        &graph,
    )
    .unwrap();

    assert_eq!(request.filters.get("title__eq"), Some(&json!("x")));
    assert_eq!(request.sorting, vec!["-title"]);
    assert_eq!(request.pagination.map(|p| (p.size, p.number)), Some((10, 2)));
    assert_eq!(request.include, vec!["author"]);
    assert_eq!(request.sparse_fields, Some(vec!["title".to_string()]));
}

// ============================================================================
// Pagination links
// ============================================================================

#[test]
fn links_preserve_other_parameters_and_rewrite_number() {
    let params = params("page[size]=2&page[number]=2&sort=id");
    let page = parse_page(&params).unwrap().unwrap();
    let links = page_links(&params, page.size, page.number, 5);

    assert_eq!(
        links.self_,
        "/articles/?page%5Bsize%5D=2&page%5Bnumber%5D=2&sort=id"
    );
    assert_eq!(
        links.first,
        "/articles/?page%5Bsize%5D=2&page%5Bnumber%5D=1&sort=id"
    );
    assert_eq!(
        links.previous.as_deref(),
        Some("/articles/?page%5Bsize%5D=2&page%5Bnumber%5D=1&sort=id")
    );
    assert_eq!(
        links.next.as_deref(),
        Some("/articles/?page%5Bsize%5D=2&page%5Bnumber%5D=3&sort=id")
    );
    assert_eq!(
        links.last,
        "/articles/?page%5Bsize%5D=2&page%5Bnumber%5D=3&sort=id"
    );
}

#[test]
fn links_collapse_on_single_page() {
    let params = params("page[size]=10&page[number]=1");
    let links = page_links(&params, 10, 1, 3);
    assert_eq!(links.previous, None);
    assert_eq!(links.next, None);
    assert_eq!(links.first, links.last);
}

#[test]
fn links_insert_page_number_when_absent() {
    let params = params("sort=id");
    let links = page_links(&params, 10, 1, 30);
    assert!(links.next.as_deref().unwrap().contains("page%5Bnumber%5D=2"));
}
