use thiserror::Error;

/// Errors raised while compiling filters and statements
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unsupported filter operator '{operator}' on column '{column}'")]
    UnsupportedOperator { column: String, operator: String },

    #[error("Invalid operand for column '{column}': {reason}")]
    InvalidOperand { column: String, reason: String },

    #[error("Conflicting filter operators on column '{0}'")]
    ConflictingOperators(String),

    #[error("Range filter on column '{0}' needs at least one of $min and $max")]
    EmptyRange(String),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Invalid sort direction: {0}")]
    InvalidSortOrder(String),

    #[error("Invalid order specification: {0}")]
    InvalidOrderSpec(String),

    #[error("Identifier cannot be empty")]
    EmptyIdentifier,

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("No columns given for {0}")]
    NoColumns(&'static str),
}

impl QueryError {
    pub(crate) fn operand(column: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidOperand {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}
