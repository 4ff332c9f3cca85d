//! PostgreSQL via tokio-postgres
//!
//! Parameters are bound with the types the server infers for the prepared
//! statement, and columns are decoded by their declared type. A column of a type
//! listed in neither direction is an error instead of a silent null.

use crate::errors::BackendError;
use crate::session::{ExecOutcome, Row, Session};
use crate::socket::SocketTuning;
use crate::values;
use async_trait::async_trait;
use config::{BackendConfig, ConfigError, SslMode};
use query_builder::Dialect;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Column, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, trace};
use uuid::Uuid;

type Param = Box<dyn ToSql + Sync + Send>;

/// Where and how to connect
#[derive(Clone)]
pub(crate) struct PgTarget {
    config: tokio_postgres::Config,
    tls: Option<MakeRustlsConnect>,
}

impl std::fmt::Debug for PgTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTarget")
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

impl PgTarget {
    pub(crate) fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.effective_port())
            .user(&config.username)
            .dbname(&config.database)
            .application_name(&config.instance_name)
            .connect_timeout(config.connection_timeout());
        if !config.password.is_empty() {
            pg.password(&config.password);
        }

        for (key, value) in &config.extra {
            match key.as_str() {
                "options" => {
                    pg.options(value);
                }
                other => {
                    return Err(BackendError::Config(ConfigError::Invalid(format!(
                        "Backend '{}': unknown PostgreSQL option '{}'",
                        config.instance_name, other
                    ))))
                }
            }
        }

        SocketTuning::from_config(config).apply_to_postgres(&mut pg);

        let tls = match config.effective_ssl_mode().unwrap_or(SslMode::Prefer) {
            SslMode::Disable | SslMode::Allow => {
                pg.ssl_mode(PgSslMode::Disable);
                None
            }
            SslMode::Prefer => {
                pg.ssl_mode(PgSslMode::Prefer);
                Some(tls_connector()?)
            }
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                pg.ssl_mode(PgSslMode::Require);
                Some(tls_connector()?)
            }
        };

        Ok(Self { config: pg, tls })
    }

    pub(crate) async fn connect(&self) -> Result<PgConnection, BackendError> {
        let client = match &self.tls {
            Some(tls) => {
                let (client, connection) = self.config.connect(tls.clone()).await?;
                drive(connection);
                client
            }
            None => {
                let (client, connection) = self.config.connect(NoTls).await?;
                drive(connection);
                client
            }
        };
        Ok(PgConnection { client })
    }
}

/// Server certificates are checked against the Mozilla root store
fn tls_connector() -> Result<MakeRustlsConnect, BackendError> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| BackendError::Config(ConfigError::Invalid(format!("TLS setup: {e}"))))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(MakeRustlsConnect::new(tls))
}

/// The connection object does the socket IO and has to be polled on its own task
fn drive<F>(connection: F)
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(error = %e, "PostgreSQL connection ended");
        }
    });
}

/// An open PostgreSQL session
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    pub(crate) async fn health_check(&self) -> Result<(), BackendError> {
        self.client.batch_execute("BEGIN; SELECT 1; ROLLBACK").await?;
        Ok(())
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

/// `None` for SQL NULL, otherwise the converted value or a bind error
fn typed<T>(
    value: &Value,
    ty: &Type,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Result<Option<T>, BackendError> {
    if value.is_null() {
        return Ok(None);
    }
    convert(value)
        .map(Some)
        .ok_or_else(|| BackendError::Bind(format!("{value} cannot be bound as {ty}")))
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn real(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string(value: &Value) -> Option<&str> {
    value.as_str()
}

fn to_param(value: &Value, ty: &Type) -> Result<Param, BackendError> {
    let param: Param = match *ty {
        Type::BOOL => Box::new(typed(value, ty, |v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            _ => None,
        })?),
        Type::INT2 => Box::new(typed(value, ty, |v| {
            integer(v).and_then(|i| i16::try_from(i).ok())
        })?),
        Type::INT4 => Box::new(typed(value, ty, |v| {
            integer(v).and_then(|i| i32::try_from(i).ok())
        })?),
        Type::INT8 => Box::new(typed(value, ty, integer)?),
        Type::OID => Box::new(typed(value, ty, |v| {
            integer(v).and_then(|i| u32::try_from(i).ok())
        })?),
        Type::FLOAT4 => Box::new(typed(value, ty, |v| real(v).map(|f| f as f32))?),
        Type::FLOAT8 => Box::new(typed(value, ty, real)?),
        Type::NUMERIC => Box::new(typed(value, ty, numeric)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Box::new(typed(value, ty, text)?)
        }
        Type::JSON | Type::JSONB => Box::new(typed(value, ty, |v| Some(v.clone()))?),
        Type::UUID => Box::new(typed(value, ty, |v| {
            string(v).and_then(|s| Uuid::parse_str(s).ok())
        })?),
        Type::DATE => Box::new(typed(value, ty, |v| string(v).and_then(values::parse_date))?),
        Type::TIME => Box::new(typed(value, ty, |v| string(v).and_then(values::parse_time))?),
        Type::TIMESTAMP => Box::new(typed(value, ty, |v| {
            string(v).and_then(values::parse_datetime)
        })?),
        Type::TIMESTAMPTZ => Box::new(typed(value, ty, |v| {
            string(v).and_then(values::parse_datetime_tz)
        })?),
        Type::BYTEA => Box::new(typed(value, ty, |v| match v {
            Value::String(s) => Some(s.as_bytes().to_vec()),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect(),
            _ => None,
        })?),
        _ => {
            return Err(BackendError::Unsupported(format!(
                "parameter of type {ty}; cast it in the statement"
            )))
        }
    };
    Ok(param)
}

fn bind(types: &[Type], params: &[Value]) -> Result<Vec<Param>, BackendError> {
    if types.len() != params.len() {
        return Err(BackendError::Bind(format!(
            "statement takes {} parameters, {} given",
            types.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(types)
        .map(|(value, ty)| to_param(value, ty))
        .collect()
}

fn as_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| &**p as &(dyn ToSql + Sync))
        .collect()
}

fn get<T>(row: &tokio_postgres::Row, idx: usize, column: &Column) -> Result<Option<T>, BackendError>
where
    T: for<'a> FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| BackendError::Decode(format!("column '{}': {e}", column.name())))
}

fn column_value(
    row: &tokio_postgres::Row,
    idx: usize,
    column: &Column,
) -> Result<Value, BackendError> {
    let value = match *column.type_() {
        Type::BOOL => get::<bool>(row, idx, column)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx, column)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx, column)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx, column)?.map(Value::from),
        Type::OID => get::<u32>(row, idx, column)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx, column)?
            .map(|f| values::float(f64::from(f)))
            .transpose()?,
        Type::FLOAT8 => get::<f64>(row, idx, column)?
            .map(values::float)
            .transpose()?,
        Type::NUMERIC => get::<Decimal>(row, idx, column)?
            .map(|d| values::decimal(&d.to_string()))
            .transpose()?,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx, column)?.map(Value::String)
        }
        Type::JSON | Type::JSONB => get::<Value>(row, idx, column)?,
        Type::UUID => get::<Uuid>(row, idx, column)?.map(|u| Value::String(u.to_string())),
        Type::DATE => get::<chrono::NaiveDate>(row, idx, column)?.map(values::date),
        Type::TIME => get::<chrono::NaiveTime>(row, idx, column)?.map(values::time),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx, column)?.map(values::datetime),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::FixedOffset>>(row, idx, column)?
            .map(values::datetime_tz),
        Type::BYTEA => get::<Vec<u8>>(row, idx, column)?.map(values::bytes),
        ref other => {
            return Err(BackendError::Decode(format!(
                "column '{}' has unsupported type {}; cast it in the query",
                column.name(),
                other
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn convert_row(row: &tokio_postgres::Row) -> Result<Row, BackendError> {
    let columns = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| Ok((column.name().to_string(), column_value(row, idx, column)?)))
        .collect::<Result<Map<String, Value>, BackendError>>()?;
    Ok(Row::new(columns))
}

#[async_trait]
impl Session for PgConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        let statement = self.client.prepare(sql).await?;
        let bound = bind(statement.params(), params)?;
        let rows = self.client.query(&statement, &as_refs(&bound)).await?;
        trace!(rows = rows.len(), "Fetched");
        rows.iter().map(convert_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, BackendError> {
        let statement = self.client.prepare(sql).await?;
        let bound = bind(statement.params(), params)?;
        let rows_affected = self.client.execute(&statement, &as_refs(&bound)).await?;
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::BackendKind;
    use serde_json::json;
    use std::time::Duration;

    fn postgres_config() -> BackendConfig {
        BackendConfig::new(
            BackendKind::Postgres,
            "db.internal".into(),
            "app".into(),
            "svc".into(),
            "p&ss word".into(),
        )
        .with_connection_timeout(7)
    }

    #[test]
    fn test_target_carries_keepalives() {
        let target = PgTarget::new(&postgres_config()).unwrap();
        assert!(target.config.get_keepalives());
        assert_eq!(target.config.get_keepalives_idle(), Duration::from_secs(7));
        assert_eq!(target.config.get_dbname(), Some("app"));
        assert_eq!(target.config.get_password(), Some("p&ss word".as_bytes()));
        assert!(target.tls.is_some());

        let plain = PgTarget::new(&postgres_config().with_ssl_mode(SslMode::Disable)).unwrap();
        assert!(plain.tls.is_none());
    }

    #[test]
    fn test_only_known_extra_options() {
        let config = postgres_config().with_extra("options", "-c search_path=app");
        let target = PgTarget::new(&config).unwrap();
        assert_eq!(target.config.get_options(), Some("-c search_path=app"));

        let config = postgres_config().with_extra("target_session_attrs", "read-write");
        assert!(matches!(PgTarget::new(&config), Err(BackendError::Config(_))));
    }

    #[test]
    fn test_params_follow_statement_types() {
        assert!(to_param(&json!(true), &Type::BOOL).is_ok());
        assert!(to_param(&json!(1), &Type::BOOL).is_ok());
        assert!(to_param(&json!("12"), &Type::INT4).is_ok());
        assert!(to_param(&json!(12.25), &Type::NUMERIC).is_ok());
        assert!(to_param(&json!("2024-05-01T13:45:00"), &Type::TIMESTAMP).is_ok());
        assert!(to_param(&Value::Null, &Type::UUID).is_ok());

        assert!(matches!(
            to_param(&json!(70000), &Type::INT2),
            Err(BackendError::Bind(_))
        ));
        assert!(matches!(
            to_param(&json!("yesterday"), &Type::DATE),
            Err(BackendError::Bind(_))
        ));
        assert!(matches!(
            to_param(&json!("(1,2)"), &Type::POINT),
            Err(BackendError::Unsupported(_))
        ));
        assert!(matches!(
            bind(&[Type::INT4], &[]),
            Err(BackendError::Bind(_))
        ));
    }
}
