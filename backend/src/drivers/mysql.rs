//! MySQL via sqlx
//!
//! Columns are decoded by the type the server reports for them. `TINYINT(1)`
//! is reported as `BOOLEAN` and becomes a JSON boolean.

use crate::errors::BackendError;
use crate::session::{ExecOutcome, Row, Session};
use crate::values;
use async_trait::async_trait;
use config::BackendConfig;
use query_builder::Dialect;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Decode, MySql, MySqlConnection, Row as _, Type, TypeInfo, ValueRef};

pub(crate) fn connect_options(config: &BackendConfig) -> Result<MySqlConnectOptions, BackendError> {
    Ok(MySqlConnectOptions::from_url(&config.connection_url()?)?)
}

pub(crate) async fn health_check(conn: &mut MySqlConnection) -> Result<(), BackendError> {
    let mut tx = conn.begin().await?;
    sqlx::query("SELECT 1").execute(&mut *tx).await?;
    tx.rollback().await?;
    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        // Arrays and objects are stored as JSON text
        other => query.bind(other.to_string()),
    }
}

fn build_query<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, MySql, MySqlArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

fn get<'r, T>(row: &'r MySqlRow, idx: usize, name: &str) -> Result<T, BackendError>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<T, _>(idx)
        .map_err(|e| BackendError::Decode(format!("column '{name}': {e}")))
}

fn column_value(row: &MySqlRow, idx: usize) -> Result<Value, BackendError> {
    let column = &row.columns()[idx];
    let name = column.name();
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match column.type_info().name() {
        "BOOLEAN" => Value::Bool(get::<bool>(row, idx, name)?),
        "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" | "BIGINT" => {
            Value::from(get::<i64>(row, idx, name)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED"
        | "BIGINT UNSIGNED" => Value::from(get::<u64>(row, idx, name)?),
        // Reported unsigned by the server
        "YEAR" | "BIT" => match row.try_get::<u64, _>(idx) {
            Ok(v) => Value::from(v),
            Err(_) => Value::from(get::<i64>(row, idx, name)?),
        },
        "FLOAT" => values::float(f64::from(get::<f32>(row, idx, name)?))?,
        "DOUBLE" => values::float(get::<f64>(row, idx, name)?)?,
        "DECIMAL" => values::decimal(&get::<Decimal>(row, idx, name)?.to_string())?,
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            Value::String(get::<String>(row, idx, name)?)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            values::bytes(get::<Vec<u8>>(row, idx, name)?)
        }
        "JSON" => get::<Value>(row, idx, name)?,
        "DATE" => values::date(get::<chrono::NaiveDate>(row, idx, name)?),
        "TIME" => values::time(get::<chrono::NaiveTime>(row, idx, name)?),
        "DATETIME" | "TIMESTAMP" => values::datetime(get::<chrono::NaiveDateTime>(row, idx, name)?),
        other => {
            return Err(BackendError::Decode(format!(
                "column '{name}' has unsupported type {other}; cast it in the query"
            )))
        }
    };
    Ok(value)
}

fn convert_row(row: &MySqlRow) -> Result<Row, BackendError> {
    let columns = (0..row.columns().len())
        .map(|idx| Ok((row.columns()[idx].name().to_string(), column_value(row, idx)?)))
        .collect::<Result<Map<String, Value>, BackendError>>()?;
    Ok(Row::new(columns))
}

#[async_trait]
impl Session for MySqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .filter(|id| *id != 0),
        })
    }
}
