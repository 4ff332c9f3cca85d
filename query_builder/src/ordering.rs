//! Result ordering

use crate::errors::QueryError;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Err(QueryError::InvalidSortOrder(s.to_string()))
        }
    }
}

/// Ordered `(column, direction)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSpec {
    items: Vec<(String, SortOrder)>,
}

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(mut self, column: &str, order: SortOrder) -> Self {
        self.items.push((column.to_string(), order));
        self
    }

    pub fn asc(self, column: &str) -> Self {
        self.by(column, SortOrder::Asc)
    }

    pub fn desc(self, column: &str) -> Self {
        self.by(column, SortOrder::Desc)
    }

    /// Parse the wire shape `[[column, "ASC" | "DESC" | null], ...]`.
    /// A bare column string or a one-element pair sorts ascending.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let Value::Array(pairs) = value else {
            return Err(QueryError::InvalidOrderSpec(
                "order must be a list of [column, direction] pairs".to_string(),
            ));
        };

        let mut spec = Self::new();
        for pair in pairs {
            let (column, direction) = match pair {
                Value::String(column) => (column.as_str(), None),
                Value::Array(parts) if matches!(parts.len(), 1 | 2) => {
                    let Value::String(column) = &parts[0] else {
                        return Err(QueryError::InvalidOrderSpec(format!(
                            "column name must be a string, got {}",
                            parts[0]
                        )));
                    };
                    (column.as_str(), parts.get(1))
                }
                other => {
                    return Err(QueryError::InvalidOrderSpec(format!(
                        "unexpected order entry {}",
                        other
                    )))
                }
            };

            let order = match direction {
                None | Some(Value::Null) => SortOrder::Asc,
                Some(Value::String(s)) => s.parse()?,
                Some(other) => return Err(QueryError::InvalidSortOrder(other.to_string())),
            };
            spec = spec.by(column, order);
        }
        Ok(spec)
    }

    pub fn items(&self) -> &[(String, SortOrder)] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<(String, SortOrder)>> for OrderSpec {
    fn from(items: Vec<(String, SortOrder)>) -> Self {
        Self { items }
    }
}
