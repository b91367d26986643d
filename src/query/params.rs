//! Decoded query-string access shared by every parser.
//!
//! `QueryParams` is the boundary between raw HTTP input and the typed
//! parsers: an order-preserving multimap of percent-decoded pairs plus the
//! request path, which pagination link generation rewrites.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

// Encode set for link re-serialization: everything a query value must escape.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'&')
    .add(b'%')
    .add(b'+')
    .add(b'=')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']');

fn decode_component(raw: &str) -> String {
    let plus_decoded: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_VALUE).to_string()
}

// ============================================================================
// QueryParams
// ============================================================================

/// One request's decoded query parameters, in order of appearance.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    path: String,
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse a request path and raw query string, e.g.
    /// `QueryParams::parse("/examples/", "filter%5Bbasic%5D=text&sort=-id")`.
    pub fn parse(path: &str, query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((k, v)) => (decode_component(k), decode_component(v)),
                None => (decode_component(part), String::new()),
            })
            .collect();
        QueryParams {
            path: path.to_string(),
            pairs,
        }
    }

    /// Build from already-decoded pairs (handy in tests and host adapters).
    pub fn from_pairs<I, K, V>(path: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        QueryParams {
            path: path.to_string(),
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last value for `key`, if any. Duplicate keys: last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All pairs in order of appearance.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Pairs whose key starts with `prefix` (e.g. `filter`, `fields`).
    pub fn pairs_prefixed<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.pairs().filter(move |(k, _)| k.starts_with(prefix))
    }

    /// The current request URL with `page[number]` rewritten to `number`
    /// (inserted if absent). Used for pagination links.
    pub fn url_with_page_number(&self, number: u64) -> String {
        let target = number.to_string();
        let mut pairs: Vec<(String, String)> = self.pairs.clone();
        let mut replaced = false;
        for (k, v) in pairs.iter_mut() {
            if k == "page[number]" {
                *v = target.clone();
                replaced = true;
            }
        }
        if !replaced {
            pairs.push(("page[number]".to_string(), target));
        }
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

// ============================================================================
// Tests
// ============================================================================
