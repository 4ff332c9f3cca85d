//! SQL dialects
//!
//! Everything that differs between the supported engines at the SQL text level:
//! identifier quoting, parameter placeholders, boolean literals, pagination and
//! how an INSERT reports the generated identity.

use crate::errors::QueryError;
use crate::validation::is_plain_identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
    MsSql,
    Sqlite,
}

/// How an INSERT hands back the generated identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    /// `INSERT ... RETURNING key`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.key VALUES ...`
    Output,
    /// No clause; the driver reports the last insert id
    LastInsertId,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::MsSql => "mssql",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn quote_chars(&self) -> (char, char) {
        match self {
            Dialect::Postgres | Dialect::Sqlite => ('"', '"'),
            Dialect::MySql => ('`', '`'),
            Dialect::MsSql => ('[', ']'),
        }
    }

    /// Render one identifier part. Plain lowercase names pass through bare,
    /// everything else is quoted with the closing quote character doubled.
    pub fn quote_identifier(&self, name: &str) -> Result<String, QueryError> {
        if name.is_empty() {
            return Err(QueryError::EmptyIdentifier);
        }
        if name.contains('\0') {
            return Err(QueryError::InvalidIdentifier(name.to_string()));
        }
        if is_plain_identifier(name) {
            return Ok(name.to_string());
        }

        let (open, close) = self.quote_chars();
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(open);
        for c in name.chars() {
            if c == close {
                quoted.push(close);
            }
            quoted.push(c);
        }
        quoted.push(close);
        Ok(quoted)
    }

    /// Render `qualifier.name`, or just `name` when there is no qualifier
    pub fn identifier(&self, qualifier: Option<&str>, name: &str) -> Result<String, QueryError> {
        match qualifier {
            Some(q) if !q.is_empty() => Ok(format!(
                "{}.{}",
                self.quote_identifier(q)?,
                self.quote_identifier(name)?
            )),
            _ => self.quote_identifier(name),
        }
    }

    /// Render a column reference; `alias.column` is split and each part quoted
    pub fn column(&self, column: &str) -> Result<String, QueryError> {
        match column.split_once('.') {
            Some((qualifier, name)) if !qualifier.is_empty() => {
                self.identifier(Some(qualifier), name)
            }
            _ => self.quote_identifier(column),
        }
    }

    /// Placeholder for the `index`-th (1-based) bound parameter
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MsSql => format!("@P{}", index),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    pub fn bool_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::MsSql, true) => "1",
            (Dialect::MsSql, false) => "0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }

    /// Pagination clause; a limit of zero means no clause at all
    pub fn limit_clause(&self, offset: u64, limit: u64) -> Option<String> {
        if limit == 0 {
            return None;
        }
        Some(match self {
            Dialect::MsSql => format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit),
            _ => format!("LIMIT {} OFFSET {}", limit, offset),
        })
    }

    /// MSSQL only paginates ordered result sets
    pub fn requires_order_for_limit(&self) -> bool {
        matches!(self, Dialect::MsSql)
    }

    pub fn returning_style(&self) -> ReturningStyle {
        match self {
            Dialect::Postgres | Dialect::Sqlite => ReturningStyle::Returning,
            Dialect::MsSql => ReturningStyle::Output,
            Dialect::MySql => ReturningStyle::LastInsertId,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered parameter list that hands out placeholders as values are bound
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Params {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Bind a value and return the placeholder that refers to it
    pub fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
