//! SQL Server via tiberius
//!
//! tiberius runs over any async stream, so the TCP socket is dialed here and gets
//! the keepalive profile before the TDS handshake starts.

use super::expect_kind;
use crate::errors::BackendError;
use crate::manager::ManageConnection;
use crate::session::{ExecOutcome, Row, Session};
use crate::socket::SocketTuning;
use async_trait::async_trait;
use config::{BackendConfig, BackendKind, SslMode};
use query_builder::Dialect;
use crate::values;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use tiberius::{AuthMethod, Client, ColumnData, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

pub type MsSqlClient = Client<Compat<TcpStream>>;

/// An open SQL Server session
pub struct MsSqlConnection {
    client: MsSqlClient,
}

impl MsSqlConnection {
    pub fn client(&mut self) -> &mut MsSqlClient {
        &mut self.client
    }
}

impl std::fmt::Debug for MsSqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsSqlConnection").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct MsSqlManager {
    config: BackendConfig,
    tds: tiberius::Config,
    tuning: SocketTuning,
}

impl MsSqlManager {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        expect_kind(&config, &[BackendKind::MsSql])?;

        let mut tds = tiberius::Config::new();
        tds.host(&config.host);
        tds.port(config.effective_port());
        tds.database(&config.database);
        tds.application_name(&config.instance_name);
        tds.authentication(AuthMethod::sql_server(&config.username, &config.password));

        match config.ssl_mode {
            Some(SslMode::Disable) => tds.encryption(EncryptionLevel::NotSupported),
            Some(SslMode::VerifyCa) | Some(SslMode::VerifyFull) => {
                tds.encryption(EncryptionLevel::Required)
            }
            Some(SslMode::Require) => {
                tds.encryption(EncryptionLevel::Required);
                tds.trust_cert();
            }
            _ => {
                tds.encryption(EncryptionLevel::On);
                tds.trust_cert();
            }
        }

        let tuning = SocketTuning::from_config(&config);
        Ok(Self {
            config,
            tds,
            tuning,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn dial(&self, tds: tiberius::Config) -> Result<MsSqlClient, BackendError> {
        let tcp = TcpStream::connect(tds.get_addr()).await?;
        tcp.set_nodelay(true)?;
        self.tuning.apply(&tcp)?;
        Ok(Client::connect(tds, tcp.compat_write()).await?)
    }
}

#[async_trait]
impl ManageConnection for MsSqlManager {
    type Connection = MsSqlConnection;

    fn describe(&self) -> String {
        self.config.redacted_url()
    }

    async fn connect(&self) -> Result<MsSqlConnection, BackendError> {
        let client = match self.dial(self.tds.clone()).await {
            Ok(client) => client,
            // Azure SQL may redirect the login to another node
            Err(BackendError::MsSql(tiberius::error::Error::Routing { host, port })) => {
                debug!(host = %host, port, "Following SQL Server routing redirect");
                let mut tds = self.tds.clone();
                tds.host(&host);
                tds.port(port);
                self.dial(tds).await?
            }
            Err(e) => return Err(e),
        };

        debug!(target_url = %self.describe(), "Connected");
        Ok(MsSqlConnection { client })
    }

    async fn health_check(&self, conn: &mut MsSqlConnection) -> Result<(), BackendError> {
        conn.client
            .simple_query("BEGIN TRAN; SELECT 1; ROLLBACK TRAN;")
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn disconnect(&self, conn: MsSqlConnection) {
        if let Err(e) = conn.client.close().await {
            warn!(error = %e, "Error while closing SQL Server connection");
        }
    }
}

fn build_query<'a>(sql: &'a str, params: &'a [Value]) -> Query<'a> {
    let mut query = Query::new(sql);
    for value in params {
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
    query
}

fn temporal<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Result<Option<T>, BackendError> {
    T::from_sql(data).map_err(|e| BackendError::Decode(e.to_string()))
}

fn column_value(data: ColumnData<'static>) -> Result<Value, BackendError> {
    let value = match &data {
        ColumnData::U8(v) => v.map(Value::from),
        ColumnData::I16(v) => v.map(Value::from),
        ColumnData::I32(v) => v.map(Value::from),
        ColumnData::I64(v) => v.map(Value::from),
        ColumnData::F32(v) => v.map(|f| values::float(f64::from(f))).transpose()?,
        ColumnData::F64(v) => v.map(values::float).transpose()?,
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => v.as_ref().map(|g| Value::String(g.to_string())),
        ColumnData::Numeric(v) => v.as_ref().map(|n| values::decimal(&n.to_string())).transpose()?,
        ColumnData::Binary(v) => v.as_ref().map(|b| values::bytes(b.to_vec())),
        ColumnData::Xml(v) => v.as_ref().map(|x| Value::String(x.to_string())),
        ColumnData::Date(_) => temporal::<NaiveDate>(&data)?.map(values::date),
        ColumnData::Time(_) => temporal::<NaiveTime>(&data)?.map(values::time),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(&data)?.map(values::datetime)
        }
        ColumnData::DateTimeOffset(_) => {
            temporal::<DateTime<FixedOffset>>(&data)?.map(values::datetime_tz)
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn convert_row(row: tiberius::Row) -> Result<Row, BackendError> {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let columns = names
        .into_iter()
        .zip(row.into_iter())
        .map(|(name, data)| {
            column_value(data)
                .map(|value| (name.clone(), value))
                .map_err(|e| match e {
                    BackendError::Decode(msg) => BackendError::Decode(format!("column '{name}': {msg}")),
                    other => other,
                })
        })
        .collect::<Result<Map<String, Value>, BackendError>>()?;
    Ok(Row::new(columns))
}

#[async_trait]
impl Session for MsSqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::MsSql
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        let stream = build_query(sql, params).query(&mut self.client).await?;
        let rows = stream.into_first_result().await?;
        rows.into_iter().map(convert_row).collect()
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, BackendError> {
        let stream = build_query(sql, params).query(&mut self.client).await?;
        stream.into_row().await?.map(convert_row).transpose()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, BackendError> {
        let result = build_query(sql, params).execute(&mut self.client).await?;
        Ok(ExecOutcome {
            rows_affected: result.total(),
            last_insert_id: None,
        })
    }
}
