//! SQL generation
//!
//! Compiles filters, ordering and pagination into dialect specific fragments, and
//! renders the INSERT/UPDATE/DELETE statements the data wrapper executes.

use crate::dialect::{Dialect, Params, ReturningStyle};
use crate::errors::QueryError;
use crate::filter::{FilterExpression, FilterOp};
use crate::ordering::OrderSpec;
use crate::pagination::Pagination;
use serde_json::{Map, Value};

/// Filter, order and limit fragments with the parameters the filter bound
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Conditions joined with AND, without the WHERE keyword; empty when unfiltered
    pub where_clause: String,
    /// `ORDER BY ...` or empty
    pub order_clause: String,
    /// Dialect pagination clause or empty
    pub limit_clause: String,
    pub params: Vec<Value>,
}

/// A complete statement ready to execute
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledQuery {
    pub fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

pub struct SqlGenerator;

impl SqlGenerator {
    /// Compile filter, order and pagination in one pass
    pub fn compile(
        dialect: Dialect,
        filter: &FilterExpression,
        order: &OrderSpec,
        pagination: &Pagination,
    ) -> Result<CompiledFilter, QueryError> {
        let mut params = Params::new(dialect);
        let where_clause = Self::build_where_fragment(filter, &mut params)?;
        let limit_clause = Self::build_limit_clause(dialect, pagination);
        let mut order_clause = Self::build_order_clause(dialect, order)?;

        if order_clause.is_empty() && !limit_clause.is_empty() && dialect.requires_order_for_limit()
        {
            order_clause = "ORDER BY (SELECT NULL)".to_string();
        }

        Ok(CompiledFilter {
            where_clause,
            order_clause,
            limit_clause,
            params: params.into_values(),
        })
    }

    /// Build the condition list of a WHERE clause, without the keyword
    pub fn build_where_fragment(
        filter: &FilterExpression,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        let conditions = filter
            .entries()
            .iter()
            .map(|(column, op)| Self::build_condition_sql(column, op, params))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(conditions.join(" AND "))
    }

    /// Build WHERE clause from a filter, empty when there is nothing to filter on
    pub fn build_where_clause(
        filter: &FilterExpression,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        let fragment = Self::build_where_fragment(filter, params)?;
        if fragment.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("WHERE {}", fragment))
        }
    }

    fn build_condition_sql(
        column: &str,
        op: &FilterOp,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        let dialect = params.dialect();
        let field = dialect.column(column)?;

        let sql = match op {
            FilterOp::Equals(value) => format!("{} = {}", field, params.bind(value.clone())),
            FilterOp::Bool(flag) => format!("{} = {}", field, dialect.bool_literal(*flag)),
            FilterOp::Contains(text) => {
                format!("{} LIKE {}", field, params.bind(Value::String(format!("%{}%", text))))
            }
            FilterOp::StartsWith(text) => {
                format!("{} LIKE {}", field, params.bind(Value::String(format!("{}%", text))))
            }
            FilterOp::EndsWith(text) => {
                format!("{} LIKE {}", field, params.bind(Value::String(format!("%{}", text))))
            }
            FilterOp::Range { min, max } => match (min, max) {
                (Some(min), Some(max)) => {
                    let low = params.bind(min.clone());
                    let high = params.bind(max.clone());
                    format!("{} BETWEEN {} AND {}", field, low, high)
                }
                (Some(min), None) => format!("{} >= {}", field, params.bind(min.clone())),
                (None, Some(max)) => format!("{} <= {}", field, params.bind(max.clone())),
                (None, None) => return Err(QueryError::EmptyRange(column.to_string())),
            },
            FilterOp::In(values) => {
                if values.is_empty() {
                    return Ok("1=0".to_string()); // Empty IN clause
                }
                format!("{} IN ({})", field, Self::bind_list(values, params))
            }
            FilterOp::NotIn(values) => {
                if values.is_empty() {
                    return Ok("1=1".to_string()); // Empty NOT IN clause
                }
                format!("{} NOT IN ({})", field, Self::bind_list(values, params))
            }
            FilterOp::Not(value) => format!("{} != {}", field, params.bind(value.clone())),
            FilterOp::Gt(value) => format!("{} > {}", field, params.bind(value.clone())),
            FilterOp::Gte(value) => format!("{} >= {}", field, params.bind(value.clone())),
            FilterOp::Lt(value) => format!("{} < {}", field, params.bind(value.clone())),
            FilterOp::Lte(value) => format!("{} <= {}", field, params.bind(value.clone())),
            FilterOp::IsNull => format!("{} IS NULL", field),
            FilterOp::IsNotNull => format!("{} IS NOT NULL", field),
        };
        Ok(sql)
    }

    fn bind_list(values: &[Value], params: &mut Params) -> String {
        values
            .iter()
            .map(|v| params.bind(v.clone()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Build ORDER BY clause
    pub fn build_order_clause(dialect: Dialect, order: &OrderSpec) -> Result<String, QueryError> {
        if order.is_empty() {
            return Ok(String::new());
        }

        let order_items = order
            .items()
            .iter()
            .map(|(column, direction)| {
                Ok(format!("{} {}", dialect.column(column)?, direction.to_sql()))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        Ok(format!("ORDER BY {}", order_items.join(", ")))
    }

    /// Build LIMIT/OFFSET clause, empty when the limit is zero
    pub fn build_limit_clause(dialect: Dialect, pagination: &Pagination) -> String {
        pagination.to_sql(dialect).unwrap_or_default()
    }

    /// Quoted `schema.table` (or just `table`)
    pub fn table_identifier(
        dialect: Dialect,
        schema: Option<&str>,
        table: &str,
    ) -> Result<String, QueryError> {
        dialect.identifier(schema, table)
    }

    /// Join non-empty statement parts with single spaces
    pub fn assemble(parts: &[&str]) -> String {
        parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// INSERT reporting the generated identity the way the dialect supports
    pub fn build_insert(
        dialect: Dialect,
        table: &str,
        key_column: &str,
        data: &Map<String, Value>,
    ) -> Result<CompiledQuery, QueryError> {
        if data.is_empty() {
            return Err(QueryError::NoColumns("INSERT"));
        }

        let mut params = Params::new(dialect);
        let mut columns = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        for (column, value) in data {
            columns.push(dialect.quote_identifier(column)?);
            placeholders.push(params.bind(value.clone()));
        }

        let key = dialect.quote_identifier(key_column)?;
        let columns = columns.join(", ");
        let placeholders = placeholders.join(", ");

        let sql = match dialect.returning_style() {
            ReturningStyle::Returning => format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                table, columns, placeholders, key
            ),
            ReturningStyle::Output => format!(
                "INSERT INTO {} ({}) OUTPUT INSERTED.{} VALUES ({})",
                table, columns, key, placeholders
            ),
            ReturningStyle::LastInsertId => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table, columns, placeholders
            ),
        };

        Ok(CompiledQuery::new(sql, params.into_values()))
    }

    /// UPDATE the given columns of the row addressed by `key = key_value`
    pub fn build_update(
        dialect: Dialect,
        table: &str,
        data: &Map<String, Value>,
        key_column: &str,
        key_value: &Value,
    ) -> Result<CompiledQuery, QueryError> {
        if data.is_empty() {
            return Err(QueryError::NoColumns("UPDATE"));
        }

        let mut params = Params::new(dialect);
        let assignments = data
            .iter()
            .map(|(column, value)| {
                Ok(format!(
                    "{} = {}",
                    dialect.quote_identifier(column)?,
                    params.bind(value.clone())
                ))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        let key = dialect.quote_identifier(key_column)?;
        let key_param = params.bind(key_value.clone());

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            table,
            assignments.join(", "),
            key,
            key_param
        );
        Ok(CompiledQuery::new(sql, params.into_values()))
    }

    /// DELETE the row addressed by `key = key_value`
    pub fn build_delete(
        dialect: Dialect,
        table: &str,
        key_column: &str,
        key_value: &Value,
    ) -> Result<CompiledQuery, QueryError> {
        let mut params = Params::new(dialect);
        let key = dialect.quote_identifier(key_column)?;
        let key_param = params.bind(key_value.clone());

        let sql = format!("DELETE FROM {} WHERE {} = {}", table, key, key_param);
        Ok(CompiledQuery::new(sql, params.into_values()))
    }
}
