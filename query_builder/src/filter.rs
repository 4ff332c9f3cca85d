//! Filter expressions
//!
//! A filter is an ordered list of `(column, operator)` entries combined with AND.
//! Operators form a closed set with a typed operand per variant, so compiling a
//! filter is an exhaustive match instead of a lookup that can fall through.

use crate::errors::QueryError;
use serde_json::{Map, Value};

/// Filter operators with their operands
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// `col = ?`
    Equals(Value),
    /// `col = TRUE` / `col = FALSE`, rendered without a bound parameter
    Bool(bool),
    /// `col LIKE ?` with `%value%`
    Contains(String),
    /// `col LIKE ?` with `value%`
    StartsWith(String),
    /// `col LIKE ?` with `%value`
    EndsWith(String),
    /// `col >= ?`, `col <= ?` or `col BETWEEN ? AND ?`
    Range {
        min: Option<Value>,
        max: Option<Value>,
    },
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// `col != ?`
    Not(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    IsNull,
    IsNotNull,
}

impl FilterOp {
    /// DSL keyword of the operator; bare operands have none
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            FilterOp::Equals(_) | FilterOp::Bool(_) => None,
            FilterOp::Contains(_) => Some("$contains"),
            FilterOp::StartsWith(_) => Some("$starts_with"),
            FilterOp::EndsWith(_) => Some("$ends_with"),
            FilterOp::Range { .. } => Some("$min/$max"),
            FilterOp::In(_) => Some("$in"),
            FilterOp::NotIn(_) => Some("$not_in"),
            FilterOp::Not(_) => Some("$not"),
            FilterOp::Gt(_) => Some("$gt"),
            FilterOp::Gte(_) => Some("$gte"),
            FilterOp::Lt(_) => Some("$lt"),
            FilterOp::Lte(_) => Some("$lte"),
            FilterOp::IsNull => Some("$is_null"),
            FilterOp::IsNotNull => Some("$is_not_null"),
        }
    }

    /// Number of parameters this operator binds when compiled
    pub fn param_count(&self) -> usize {
        match self {
            FilterOp::Bool(_) | FilterOp::IsNull | FilterOp::IsNotNull => 0,
            FilterOp::Range { min, max } => min.is_some() as usize + max.is_some() as usize,
            FilterOp::In(values) | FilterOp::NotIn(values) => values.len(),
            _ => 1,
        }
    }

    /// Parse the value side of one filter entry
    pub fn from_json(column: &str, value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Bool(b) => Ok(FilterOp::Bool(*b)),
            Value::Number(_) | Value::String(_) => Ok(FilterOp::Equals(value.clone())),
            Value::Null => Err(QueryError::operand(
                column,
                "null cannot be compared, use $is_null",
            )),
            Value::Array(_) => Err(QueryError::operand(
                column,
                "bare arrays are not a filter, use $in",
            )),
            Value::Object(map) => Self::from_operator_map(column, map),
        }
    }

    fn from_operator_map(column: &str, map: &Map<String, Value>) -> Result<Self, QueryError> {
        if map.is_empty() {
            return Err(QueryError::operand(column, "empty operator object"));
        }

        if map.keys().all(|k| k == "$min" || k == "$max") {
            let min = map.get("$min").map(|v| scalar(column, v)).transpose()?;
            let max = map.get("$max").map(|v| scalar(column, v)).transpose()?;
            return Ok(FilterOp::Range { min, max });
        }

        if map.len() > 1 {
            return Err(QueryError::ConflictingOperators(column.to_string()));
        }

        let Some((operator, operand)) = map.iter().next() else {
            return Err(QueryError::operand(column, "empty operator object"));
        };

        let op = match operator.as_str() {
            "$contains" => FilterOp::Contains(pattern_text(column, operand)?),
            "$starts_with" => FilterOp::StartsWith(pattern_text(column, operand)?),
            "$ends_with" => FilterOp::EndsWith(pattern_text(column, operand)?),
            "$in" => FilterOp::In(list(column, operand)?),
            "$not_in" => FilterOp::NotIn(list(column, operand)?),
            "$not" => FilterOp::Not(scalar(column, operand)?),
            "$gt" => FilterOp::Gt(scalar(column, operand)?),
            "$gte" => FilterOp::Gte(scalar(column, operand)?),
            "$lt" => FilterOp::Lt(scalar(column, operand)?),
            "$lte" => FilterOp::Lte(scalar(column, operand)?),
            // The operand is only a marker, e.g. `{"$is_null": true}`
            "$is_null" => FilterOp::IsNull,
            "$is_not_null" => FilterOp::IsNotNull,
            other => {
                return Err(QueryError::UnsupportedOperator {
                    column: column.to_string(),
                    operator: other.to_string(),
                })
            }
        };
        Ok(op)
    }
}

fn scalar(column: &str, value: &Value) -> Result<Value, QueryError> {
    match value {
        Value::Null => Err(QueryError::operand(column, "operand cannot be null")),
        Value::Array(_) | Value::Object(_) => {
            Err(QueryError::operand(column, "operand must be a scalar"))
        }
        _ => Ok(value.clone()),
    }
}

fn pattern_text(column: &str, value: &Value) -> Result<String, QueryError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(QueryError::operand(
            column,
            "pattern operand must be a string or number",
        )),
    }
}

fn list(column: &str, value: &Value) -> Result<Vec<Value>, QueryError> {
    match value {
        Value::Array(items) => items.iter().map(|v| scalar(column, v)).collect(),
        _ => Err(QueryError::operand(column, "operand must be a list")),
    }
}

/// Ordered set of column filters, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    entries: Vec<(String, FilterOp)>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON filter DSL, e.g. `{"age": {"$min": 18}, "name": "ann"}`
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::InvalidFilter(
                "filter must be a JSON object".to_string(),
            ));
        };

        let entries = map
            .iter()
            .map(|(column, v)| FilterOp::from_json(column, v).map(|op| (column.clone(), op)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// Add a filter entry
    pub fn with(mut self, column: &str, op: FilterOp) -> Self {
        self.entries.push((column.to_string(), op));
        self
    }

    /// Equality; booleans render as literals
    pub fn eq(self, column: &str, value: Value) -> Self {
        let op = match value {
            Value::Bool(b) => FilterOp::Bool(b),
            other => FilterOp::Equals(other),
        };
        self.with(column, op)
    }

    pub fn not(self, column: &str, value: Value) -> Self {
        self.with(column, FilterOp::Not(value))
    }

    pub fn contains(self, column: &str, text: &str) -> Self {
        self.with(column, FilterOp::Contains(text.to_string()))
    }

    pub fn starts_with(self, column: &str, text: &str) -> Self {
        self.with(column, FilterOp::StartsWith(text.to_string()))
    }

    pub fn ends_with(self, column: &str, text: &str) -> Self {
        self.with(column, FilterOp::EndsWith(text.to_string()))
    }

    pub fn range(self, column: &str, min: Option<Value>, max: Option<Value>) -> Self {
        self.with(column, FilterOp::Range { min, max })
    }

    pub fn in_values(self, column: &str, values: Vec<Value>) -> Self {
        self.with(column, FilterOp::In(values))
    }

    pub fn not_in_values(self, column: &str, values: Vec<Value>) -> Self {
        self.with(column, FilterOp::NotIn(values))
    }

    pub fn gt(self, column: &str, value: Value) -> Self {
        self.with(column, FilterOp::Gt(value))
    }

    pub fn gte(self, column: &str, value: Value) -> Self {
        self.with(column, FilterOp::Gte(value))
    }

    pub fn lt(self, column: &str, value: Value) -> Self {
        self.with(column, FilterOp::Lt(value))
    }

    pub fn lte(self, column: &str, value: Value) -> Self {
        self.with(column, FilterOp::Lte(value))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.with(column, FilterOp::IsNull)
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.with(column, FilterOp::IsNotNull)
    }

    pub fn entries(&self) -> &[(String, FilterOp)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl TryFrom<&Value> for FilterExpression {
    type Error = QueryError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl TryFrom<Value> for FilterExpression {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}
