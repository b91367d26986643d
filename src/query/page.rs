//! The `page[size]`/`page[number]` query parameters and pagination link
//! generation.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

use super::params::QueryParams;

// ============================================================================
// Page
// ============================================================================

/// One pagination window. `number` is 1-based; `size` is a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub size: u64,
    pub number: u64,
}

/// Parse the pagination window. Both parameters absent yields `None`;
/// exactly one present, a non-integer value, or a zero value is
/// [`ApiError::InvalidPage`]. A returned `Page` always has `size >= 1` and
/// `number >= 1`.
pub fn parse_page(params: &QueryParams) -> Result<Option<Page>> {
    let size = params.get("page[size]");
    let number = params.get("page[number]");
    match (size, number) {
        (None, None) => Ok(None),
        (Some(size), Some(number)) => {
            let size = size.parse::<u64>();
            let number = number.parse::<u64>();
            match (size, number) {
                (Ok(size), Ok(number)) if size >= 1 && number >= 1 => {
                    Ok(Some(Page { size, number }))
                }
                (Ok(_), Ok(_)) => Err(ApiError::InvalidPage(
                    "Page parameters must be positive integers.".to_string(),
                )),
                _ => Err(ApiError::InvalidPage(
                    "Page parameters must be integers.".to_string(),
                )),
            }
        }
        _ => Err(ApiError::InvalidPage(
            "One of page parameters wrongly or not specified.".to_string(),
        )),
    }
}

// ============================================================================
// Links
// ============================================================================

/// The `links` member of a paginated list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(rename = "self")]
    pub self_: String,
    pub first: String,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub last: String,
}

/// Build pagination links for the current request.
///
/// `last = ceil(total_count / page_size)`; previous/next are `None` at the
/// edges. Callers must guarantee `page_size >= 1`.
pub fn page_links(
    params: &QueryParams,
    page_size: u64,
    current_page: u64,
    total_count: u64,
) -> PageLinks {
    debug_assert!(page_size >= 1, "page_size must be >= 1");
    let last_page = total_count.div_ceil(page_size).max(1);
    let previous = (current_page > 1).then(|| params.url_with_page_number(current_page - 1));
    let next =
        (current_page < last_page).then(|| params.url_with_page_number(current_page + 1));
    PageLinks {
        self_: params.url_with_page_number(current_page),
        first: params.url_with_page_number(1),
        previous,
        next,
        last: params.url_with_page_number(last_page),
    }
}

// ============================================================================
// Tests
// ============================================================================
