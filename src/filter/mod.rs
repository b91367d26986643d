//! Declarative filter schemas: operator registry, filter fields, and the
//! per-request `filter[...]` namespace parser producing the normalized
//! filter mapping.

pub mod field;
pub mod operator;
pub mod schema;

pub use field::FilterField;
pub use operator::{Operator, ALL_OPERATORS};
pub use schema::{FilterSchema, FilterSchemaBuilder};
