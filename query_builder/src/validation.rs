//! Identifier classification
//!
//! Decides whether a schema, table or column name can be emitted bare or has to
//! go through the dialect's quoting function.

/// Longest identifier emitted without quotes (PostgreSQL limit)
pub const MAX_PLAIN_LENGTH: usize = 63;

/// Common SQL reserved keywords that should not be used as bare identifiers
const RESERVED_KEYWORDS: &[&str] = &[
    // SQL Standard keywords
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "FROM",
    "WHERE",
    "JOIN",
    "INNER",
    "LEFT",
    "RIGHT",
    "FULL",
    "OUTER",
    "CROSS",
    "ON",
    "AS",
    "AND",
    "OR",
    "NOT",
    "NULL",
    "IS",
    "TRUE",
    "FALSE",
    "CASE",
    "WHEN",
    "THEN",
    "ELSE",
    "END",
    "IF",
    "EXISTS",
    "IN",
    "LIKE",
    "BETWEEN",
    "ORDER",
    "BY",
    "GROUP",
    "HAVING",
    "LIMIT",
    "OFFSET",
    "FETCH",
    "ROWS",
    "UNION",
    "ALL",
    "ANY",
    "DISTINCT",
    "CREATE",
    "DROP",
    "ALTER",
    "TABLE",
    "INDEX",
    "VIEW",
    "DATABASE",
    "SCHEMA",
    "PRIMARY",
    "KEY",
    "FOREIGN",
    "REFERENCES",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "CONSTRAINT",
    "COLUMN",
    "ADD",
    "TO",
    "INTO",
    "VALUES",
    "SET",
    "GRANT",
    "REVOKE",
    "WITH",
    "RETURNING",
    "OUTPUT",
    "USER",
    "CURRENT_USER",
    "SESSION_USER",
    // Dialect specific keywords
    "TOP",
    "IDENTITY",
    "ILIKE",
    "ANALYSE",
    "ANALYZE",
    "DESC",
    "ASC",
    "LOCK",
    "RANGE",
    "READ",
    "WINDOW",
    "ROW",
];

/// Check if a name is a reserved SQL keyword
pub fn is_reserved_keyword(name: &str) -> bool {
    RESERVED_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(name))
}

/// An identifier every supported dialect reads back unchanged without quotes:
/// lowercase ASCII letters, digits and underscores, not starting with a digit,
/// and not a reserved keyword.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');

    starts_well
        && name.len() <= MAX_PLAIN_LENGTH
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !is_reserved_keyword(name)
}
