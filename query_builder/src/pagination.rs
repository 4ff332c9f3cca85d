//! Pagination window

use crate::dialect::Dialect;

pub const DEFAULT_LIMIT: u64 = 100;

/// Offset and page size; a limit of zero disables pagination entirely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new()
    }
}

impl Pagination {
    pub fn new() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Whole result set, no LIMIT/OFFSET clause
    pub fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: 0,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit == 0
    }

    pub fn to_sql(&self, dialect: Dialect) -> Option<String> {
        dialect.limit_clause(self.offset, self.limit)
    }
}
