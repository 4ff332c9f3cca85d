//! SQLite via sqlx
//!
//! Values are decoded by their storage class. A column declared `BOOLEAN` holds
//! integers and comes back as a JSON boolean.

use crate::errors::BackendError;
use crate::session::{ExecOutcome, Row, Session};
use crate::values;
use async_trait::async_trait;
use config::BackendConfig;
use query_builder::Dialect;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection, Decode, Row as _, Sqlite, SqliteConnection, Type, TypeInfo, ValueRef};
use std::str::FromStr;

pub const MEMORY: &str = ":memory:";

/// `:memory:` opens one in-memory database shared by every connection made from
/// the returned options
pub(crate) fn connect_options(config: &BackendConfig) -> Result<SqliteConnectOptions, BackendError> {
    if config.database == MEMORY {
        return Ok(SqliteConnectOptions::from_str("sqlite::memory:")?);
    }
    Ok(SqliteConnectOptions::new()
        .filename(&config.database)
        .create_if_missing(true))
}

pub(crate) async fn health_check(conn: &mut SqliteConnection) -> Result<(), BackendError> {
    let mut tx = conn.begin().await?;
    sqlx::query("SELECT 1").execute(&mut *tx).await?;
    tx.rollback().await?;
    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

fn build_query<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

fn get<'r, T>(row: &'r SqliteRow, idx: usize, name: &str) -> Result<T, BackendError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get::<T, _>(idx)
        .map_err(|e| BackendError::Decode(format!("column '{name}': {e}")))
}

fn column_value(row: &SqliteRow, idx: usize) -> Result<Value, BackendError> {
    let column = &row.columns()[idx];
    let name = column.name();
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match (column.type_info().name(), storage.as_str()) {
        ("BOOLEAN", "INTEGER") => Value::Bool(get::<bool>(row, idx, name)?),
        (_, "INTEGER") => Value::from(get::<i64>(row, idx, name)?),
        (_, "REAL") => values::float(get::<f64>(row, idx, name)?)?,
        (_, "TEXT") => Value::String(get::<String>(row, idx, name)?),
        (_, "BLOB") => values::bytes(get::<Vec<u8>>(row, idx, name)?),
        (_, other) => {
            return Err(BackendError::Decode(format!(
                "column '{name}' holds a value of storage class {other}"
            )))
        }
    };
    Ok(value)
}

fn convert_row(row: &SqliteRow) -> Result<Row, BackendError> {
    let columns = (0..row.columns().len())
        .map(|idx| Ok((row.columns()[idx].name().to_string(), column_value(row, idx)?)))
        .collect::<Result<Map<String, Value>, BackendError>>()?;
    Ok(Row::new(columns))
}

#[async_trait]
impl Session for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        let rows = build_query(sql, params).fetch_all(&mut *self).await?;
        rows.iter().map(convert_row).collect()
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, BackendError> {
        let row = build_query(sql, params).fetch_optional(&mut *self).await?;
        row.as_ref().map(convert_row).transpose()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, BackendError> {
        let result = build_query(sql, params).execute(&mut *self).await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()).filter(|id| *id != 0),
        })
    }
}
