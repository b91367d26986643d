use serde_json::json;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// A local failure while parsing one filter field or value.
///
/// These never leave the parsing layer: `FilterSchema::parse` converts them
/// into a client-facing [`ApiError::InvalidFilters`] citing the offending
/// `key=value` pair.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("attribute field must be specified as the last field in filter")]
    TrailingSegments,

    #[error("forbidden operator '{0}'")]
    ForbiddenOperator(String),

    #[error("filtering directly by relationship is forbidden")]
    BareRelationship,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("invalid {kind} value '{raw}'")]
    InvalidValue { kind: &'static str, raw: String },
}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

/// A failure while translating a normalized filter/sort entry into a query.
///
/// Distinguishable from a generic storage failure so the HTTP boundary maps
/// it to 400, never 500.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no idea what to do with '{token}' in '{path}'")]
    UnresolvedToken { token: String, path: String },

    #[error("cannot filter on relationship '{0}' without an attribute")]
    FilterOnRelationship(String),

    #[error("you can't sort on '{0}'")]
    SortOnRelationship(String),

    #[error("operator '{operator}' expects {expected}, got {got}")]
    InvalidOperand {
        operator: &'static str,
        expected: &'static str,
        got: String,
    },
}

// ---------------------------------------------------------------------------
// ApiError - client-facing JSON:API error objects
// ---------------------------------------------------------------------------

/// A client-facing error carrying the JSON:API error-object fields.
///
/// `to_json()` produces `{status, title, detail, source}` per the JSON:API
/// errors shape; `source.parameter` names the top-level query parameter at
/// fault for the 400-class variants.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid filters querystring parameter: {0}")]
    InvalidFilters(String),

    #[error("Invalid sort querystring parameter: {0}")]
    InvalidSort(String),

    #[error("Invalid page querystring parameter: {0}")]
    InvalidPage(String),

    #[error("Invalid fields querystring parameter: {0}")]
    InvalidField(String),

    #[error("Invalid include querystring parameter: {0}")]
    InvalidInclude(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Operation forbidden: {0}")]
    Forbidden(String),

    #[error("Method not implemented: {0}")]
    NotImplemented(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::InvalidFilters(_)
            | ApiError::InvalidSort(_)
            | ApiError::InvalidPage(_)
            | ApiError::InvalidField(_)
            | ApiError::InvalidInclude(_) => 400,
            ApiError::ObjectNotFound(_) => 404,
            ApiError::Forbidden(_) => 403,
            ApiError::NotImplemented(_) => 501,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ApiError::InvalidFilters(_) => "Invalid filters querystring parameter.",
            ApiError::InvalidSort(_) => "Invalid sort querystring parameter.",
            ApiError::InvalidPage(_) => "Invalid page querystring parameter.",
            ApiError::InvalidField(_) => "Invalid fields querystring parameter.",
            ApiError::InvalidInclude(_) => "Invalid include querystring parameter.",
            ApiError::ObjectNotFound(_) => "Object not found",
            ApiError::Forbidden(_) => "Operation forbidden.",
            ApiError::NotImplemented(_) => "Method not implemented",
        }
    }

    /// The offending top-level query parameter, for 400-class errors.
    pub fn source_parameter(&self) -> Option<&'static str> {
        match self {
            ApiError::InvalidFilters(_) => Some("filters"),
            ApiError::InvalidSort(_) => Some("sort"),
            ApiError::InvalidPage(_) => Some("page"),
            ApiError::InvalidField(_) => Some("fields"),
            ApiError::InvalidInclude(_) => Some("include"),
            _ => None,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::InvalidFilters(d)
            | ApiError::InvalidSort(d)
            | ApiError::InvalidPage(d)
            | ApiError::InvalidField(d)
            | ApiError::InvalidInclude(d)
            | ApiError::ObjectNotFound(d)
            | ApiError::Forbidden(d)
            | ApiError::NotImplemented(d) => d,
        }
    }

    /// Render the JSON:API error object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = json!({
            "status": self.status(),
            "title": self.title(),
            "detail": self.detail(),
        });
        if let Some(parameter) = self.source_parameter() {
            obj["source"] = json!({ "parameter": parameter });
        }
        obj
    }
}

impl From<QueryError> for ApiError {
    /// Translation failures are malformed client input, not internal faults.
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::SortOnRelationship(_) => ApiError::InvalidSort(e.to_string()),
            other => ApiError::InvalidFilters(other.to_string()),
        }
    }
}

/// Convenience alias - the default error type is `ApiError`.
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
