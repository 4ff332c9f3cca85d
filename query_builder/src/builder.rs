//! SELECT statement builder

use crate::dialect::{Dialect, Params};
use crate::errors::QueryError;
use crate::filter::{FilterExpression, FilterOp};
use crate::ordering::{OrderSpec, SortOrder};
use crate::pagination::Pagination;
use crate::sql_generation::{CompiledFilter, CompiledQuery, SqlGenerator};
use serde_json::Value;

/// Query builder for SELECT statements against one table or a custom base query
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    pub(crate) dialect: Dialect,
    pub(crate) schema: Option<String>,
    pub(crate) table: String,
    pub(crate) alias: Option<String>,
    pub(crate) base_query: Option<String>,
    pub(crate) filter: FilterExpression,
    pub(crate) order: OrderSpec,
    pub(crate) pagination: Pagination,
}

impl QueryBuilder {
    /// Unfiltered, unordered and unpaginated `SELECT *` from `table`
    pub fn new(dialect: Dialect, table: &str) -> Self {
        Self {
            dialect,
            schema: None,
            table: table.to_string(),
            alias: None,
            base_query: None,
            filter: FilterExpression::new(),
            order: OrderSpec::new(),
            pagination: Pagination::unbounded(),
        }
    }

    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    pub fn alias(mut self, alias: Option<&str>) -> Self {
        self.alias = alias.filter(|a| !a.is_empty()).map(str::to_string);
        self
    }

    /// Replace `SELECT * FROM table` with a caller supplied statement head.
    /// Conditions, ordering and pagination are appended to it verbatim.
    pub fn base_query(mut self, sql: Option<&str>) -> Self {
        self.base_query = sql.filter(|s| !s.trim().is_empty()).map(str::to_string);
        self
    }

    /// Add all entries of a filter expression (combined with AND)
    pub fn filter(mut self, filter: FilterExpression) -> Self {
        for (column, op) in filter.entries() {
            self.filter = self.filter.with(column, op.clone());
        }
        self
    }

    /// Add an equality condition
    pub fn where_eq(mut self, column: &str, value: Value) -> Self {
        self.filter = self.filter.with(column, FilterOp::Equals(value));
        self
    }

    pub fn order(mut self, order: OrderSpec) -> Self {
        for (column, direction) in order.items() {
            self.order = self.order.by(column, *direction);
        }
        self
    }

    /// Add ordering
    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order = self.order.by(column, order);
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// Add limit; zero removes pagination
    pub fn limit(mut self, limit: u64) -> Self {
        self.pagination = self.pagination.with_limit(limit);
        self
    }

    /// Add offset
    pub fn offset(mut self, offset: u64) -> Self {
        self.pagination = self.pagination.with_offset(offset);
        self
    }

    /// Column reference qualified with the table alias when one is set
    pub fn qualified_column(&self, column: &str) -> String {
        match &self.alias {
            Some(alias) if !column.contains('.') => format!("{}.{}", alias, column),
            _ => column.to_string(),
        }
    }

    /// `SELECT * FROM schema.table AS alias`, or the custom base query
    pub fn build_source(&self) -> Result<String, QueryError> {
        if let Some(base) = &self.base_query {
            return Ok(base.trim().to_string());
        }

        let table = SqlGenerator::table_identifier(
            self.dialect,
            self.schema.as_deref(),
            &self.table,
        )?;
        match &self.alias {
            Some(alias) => Ok(format!(
                "SELECT * FROM {} AS {}",
                table,
                self.dialect.quote_identifier(alias)?
            )),
            None => Ok(format!("SELECT * FROM {}", table)),
        }
    }

    /// Build WHERE clause
    pub fn build_where_clause(&self, params: &mut Params) -> Result<String, QueryError> {
        SqlGenerator::build_where_clause(&self.filter, params)
    }

    /// Build complete query parts (WHERE, ORDER BY, LIMIT, values)
    pub fn build_parts(&self) -> Result<CompiledFilter, QueryError> {
        SqlGenerator::compile(self.dialect, &self.filter, &self.order, &self.pagination)
    }

    /// Build the full SELECT statement
    pub fn build(&self) -> Result<CompiledQuery, QueryError> {
        let source = self.build_source()?;
        let parts = self.build_parts()?;

        let where_clause = if parts.where_clause.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", parts.where_clause)
        };

        let sql = SqlGenerator::assemble(&[
            &source,
            &where_clause,
            &parts.order_clause,
            &parts.limit_clause,
        ]);
        Ok(CompiledQuery::new(sql, parts.params))
    }
}
