//! Query-string parsing, filter schemas, and query translation for JSON:API
//! services, with a storage-agnostic repository contract and a SQLite
//! reference binding.
//!
//! The flow: declare resources ([`resource`]), describe the accepted filters
//! ([`filter`]), parse a request's query string ([`query`]), translate the
//! normalized output to a SQL plan ([`translate`]), and execute it through a
//! repository ([`repository`], [`storage`]).

pub mod error;

pub mod filter;
pub mod query;
pub mod repository;
pub mod resource;
pub mod storage;
pub mod translate;

pub use error::{ApiError, ParseError, QueryError, Result};
pub use filter::{FilterField, FilterSchema};
pub use query::{Page, QueryParams, RequestQuery};
pub use repository::{ListQuery, NestedRepository, ResourceRepository};
pub use resource::{EntityGraph, ResourceDef, ValueKind};
