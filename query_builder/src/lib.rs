//! Query Builder - dialect-aware SQL generation for dbwrap
//!
//! Turns structured filter, order and pagination input into parameterized SQL
//! for PostgreSQL, MySQL, MSSQL and SQLite. Identifiers always pass through the
//! dialect's quoting function; operand values only ever travel as bound parameters.

pub mod builder;
pub mod dialect;
pub mod errors;
pub mod filter;
pub mod ordering;
pub mod pagination;
pub mod prelude;
pub mod sql_generation;
pub mod validation;

#[cfg(test)]
mod tests;

pub use builder::QueryBuilder;
pub use dialect::{Dialect, Params, ReturningStyle};
pub use errors::QueryError;
pub use filter::{FilterExpression, FilterOp};
pub use ordering::{OrderSpec, SortOrder};
pub use pagination::Pagination;
pub use sql_generation::{CompiledFilter, CompiledQuery, SqlGenerator};
