//! The `fields[<type>]` sparse-fieldset query parameters.

use std::sync::OnceLock;

use crate::error::{ApiError, Result};

use super::params::QueryParams;

static FIELDS_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn fields_regex() -> &'static regex::Regex {
    FIELDS_REGEX.get_or_init(|| regex::Regex::new(r"^fields\[([^\[\]]+)\]$").expect("fields regex is valid"))
}

/// Parse every `fields[<type>]` key into a flattened field list.
///
/// Fields of `primary_type` map 1:1; fields of any other type are
/// namespaced as `<type>.<field>`. Returns `None` when no `fields[...]`
/// parameter is present ("no restriction", distinct from an empty
/// restriction). A malformed `fields` key shape is
/// [`ApiError::InvalidField`].
pub fn parse_sparse_fields(
    params: &QueryParams,
    primary_type: &str,
) -> Result<Option<Vec<String>>> {
    let mut restriction: Option<Vec<String>> = None;
    for (key, value) in params.pairs_prefixed("fields") {
        let captures = fields_regex()
            .captures(key)
            .ok_or_else(|| ApiError::InvalidField(format!("Wrong fields parameter '{key}'.")))?;
        let type_name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let fields = restriction.get_or_insert_with(Vec::new);
        for field in value.split(',').filter(|f| !f.is_empty()) {
            if type_name == primary_type {
                fields.push(field.to_string());
            } else {
                fields.push(format!("{type_name}.{field}"));
            }
        }
    }
    Ok(restriction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_type_maps_one_to_one() {
        let params = QueryParams::parse("/articles/", "fields[articles]=title,body");
        let fields = parse_sparse_fields(&params, "articles").unwrap();
        assert_eq!(fields, Some(vec!["title".to_string(), "body".to_string()]));
    }

    #[test]
    fn other_types_are_namespaced() {
        let params =
            QueryParams::parse("/articles/", "fields[articles]=title&fields[people]=name");
        let fields = parse_sparse_fields(&params, "articles").unwrap().unwrap();
        assert_eq!(fields, vec!["title", "people.name"]);
    }

    #[test]
    fn absent_means_no_restriction() {
        let params = QueryParams::parse("/articles/", "sort=title");
        assert_eq!(parse_sparse_fields(&params, "articles").unwrap(), None);
    }

    #[test]
    fn empty_restriction_is_not_none() {
        let params = QueryParams::parse("/articles/", "fields[articles]=");
        let fields = parse_sparse_fields(&params, "articles").unwrap();
        assert_eq!(fields, Some(Vec::new()));
    }

    #[test]
    fn malformed_key_shape_rejected() {
        for raw in ["fields=title", "fields[a][b]=c"] {
            let params = QueryParams::parse("/articles/", raw);
            let err = parse_sparse_fields(&params, "articles").unwrap_err();
            assert!(matches!(err, ApiError::InvalidField(_)), "raw: {raw}");
        }
    }
}
