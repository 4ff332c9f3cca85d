//! Convenience re-exports for common query-builder usage

pub use crate::builder::QueryBuilder;
pub use crate::dialect::{Dialect, Params};
pub use crate::errors::QueryError;
pub use crate::filter::{FilterExpression, FilterOp};
pub use crate::ordering::{OrderSpec, SortOrder};
pub use crate::pagination::Pagination;
pub use crate::sql_generation::{CompiledFilter, CompiledQuery, SqlGenerator};

pub use serde_json::{json, Value};
