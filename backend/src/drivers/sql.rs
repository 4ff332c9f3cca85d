//! One connection manager for PostgreSQL, MySQL and SQLite
//!
//! Each engine runs on its own typed driver. [`SqlConnection`] wraps whichever
//! one the configuration selects, so pools and wrappers stay engine-agnostic.

use super::postgres::{PgConnection, PgTarget};
use super::{expect_kind, mysql, sqlite};
use crate::errors::BackendError;
use crate::manager::ManageConnection;
use crate::session::{ExecOutcome, Row, Session};
use async_trait::async_trait;
use config::{BackendConfig, BackendKind};
use query_builder::Dialect;
use serde_json::Value;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, MySqlConnection, SqliteConnection};
use tracing::debug;

/// An open connection to one of the engines [`SqlManager`] handles
#[derive(Debug)]
pub enum SqlConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

#[derive(Debug, Clone)]
enum Target {
    Postgres(PgTarget),
    MySql(MySqlConnectOptions),
    Sqlite(SqliteConnectOptions),
}

/// Connection manager for the SQL engines with typed drivers here
#[derive(Debug, Clone)]
pub struct SqlManager {
    config: BackendConfig,
    target: Target,
}

impl SqlManager {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        expect_kind(
            &config,
            &[BackendKind::Postgres, BackendKind::MySql, BackendKind::Sqlite],
        )?;

        let target = match config.kind {
            BackendKind::Postgres => Target::Postgres(PgTarget::new(&config)?),
            BackendKind::MySql => Target::MySql(mysql::connect_options(&config)?),
            _ => Target::Sqlite(sqlite::connect_options(&config)?),
        };
        Ok(Self { config, target })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        match self.target {
            Target::Postgres(_) => Dialect::Postgres,
            Target::MySql(_) => Dialect::MySql,
            Target::Sqlite(_) => Dialect::Sqlite,
        }
    }
}

#[async_trait]
impl ManageConnection for SqlManager {
    type Connection = SqlConnection;

    fn describe(&self) -> String {
        self.config.redacted_url()
    }

    /// PostgreSQL sockets are tuned by the driver as it dials them
    async fn connect(&self) -> Result<SqlConnection, BackendError> {
        let conn = match &self.target {
            Target::Postgres(target) => SqlConnection::Postgres(target.connect().await?),
            Target::MySql(options) => SqlConnection::MySql(options.connect().await?),
            Target::Sqlite(options) => SqlConnection::Sqlite(options.connect().await?),
        };
        debug!(target_url = %self.describe(), "Connected");
        Ok(conn)
    }

    async fn health_check(&self, conn: &mut SqlConnection) -> Result<(), BackendError> {
        match conn {
            SqlConnection::Postgres(conn) => conn.health_check().await,
            SqlConnection::MySql(conn) => mysql::health_check(conn).await,
            SqlConnection::Sqlite(conn) => sqlite::health_check(conn).await,
        }
    }

    async fn disconnect(&self, conn: SqlConnection) {
        let closed = match conn {
            // Dropping the client ends its connection task
            SqlConnection::Postgres(conn) => {
                drop(conn);
                Ok(())
            }
            SqlConnection::MySql(conn) => conn.close().await,
            SqlConnection::Sqlite(conn) => conn.close().await,
        };
        if let Err(e) = closed {
            debug!(error = %e, "Error while closing connection");
        }
    }
}

#[async_trait]
impl Session for SqlConnection {
    fn dialect(&self) -> Dialect {
        match self {
            SqlConnection::Postgres(conn) => conn.dialect(),
            SqlConnection::MySql(conn) => conn.dialect(),
            SqlConnection::Sqlite(conn) => conn.dialect(),
        }
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError> {
        match self {
            SqlConnection::Postgres(conn) => conn.fetch_all(sql, params).await,
            SqlConnection::MySql(conn) => conn.fetch_all(sql, params).await,
            SqlConnection::Sqlite(conn) => conn.fetch_all(sql, params).await,
        }
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, BackendError> {
        match self {
            SqlConnection::Postgres(conn) => conn.fetch_optional(sql, params).await,
            SqlConnection::MySql(conn) => conn.fetch_optional(sql, params).await,
            SqlConnection::Sqlite(conn) => conn.fetch_optional(sql, params).await,
        }
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, BackendError> {
        match self {
            SqlConnection::Postgres(conn) => Session::execute(conn, sql, params).await,
            SqlConnection::MySql(conn) => Session::execute(conn, sql, params).await,
            SqlConnection::Sqlite(conn) => Session::execute(conn, sql, params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_connection() -> SqlConnection {
        let manager = SqlManager::new(BackendConfig::sqlite(sqlite::MEMORY)).unwrap();
        manager.connect().await.unwrap()
    }

    #[test]
    fn test_rejects_foreign_backends() {
        let config = BackendConfig::new(
            BackendKind::Redis,
            "localhost".into(),
            "0".into(),
            String::new(),
            String::new(),
        );
        assert!(matches!(
            SqlManager::new(config),
            Err(BackendError::Config(_))
        ));
    }

    #[test]
    fn test_dialect_follows_the_backend() {
        let config = BackendConfig::new(
            BackendKind::Postgres,
            "db.internal".into(),
            "app".into(),
            "svc".into(),
            "secret".into(),
        );
        let manager = SqlManager::new(config).unwrap();
        assert_eq!(manager.dialect(), Dialect::Postgres);
        assert!(!manager.describe().contains("secret"));
    }

    #[tokio::test]
    async fn test_health_check_and_dialect() {
        let manager = SqlManager::new(BackendConfig::sqlite(sqlite::MEMORY)).unwrap();
        let mut conn = manager.connect().await.unwrap();

        manager.tune(&mut conn).await.unwrap();
        manager.health_check(&mut conn).await.unwrap();
        assert_eq!(conn.dialect(), Dialect::Sqlite);
        assert_eq!(manager.dialect(), Dialect::Sqlite);

        manager.disconnect(conn).await;
    }

    #[tokio::test]
    async fn test_bind_and_decode_round_trip() {
        let mut conn = memory_connection().await;
        conn.execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, price REAL, note TEXT, in_stock BOOLEAN)",
            &[],
        )
        .await
        .unwrap();

        let outcome = conn
            .execute(
                "INSERT INTO items (name, price, note, in_stock) VALUES (?, ?, ?, ?)",
                &[json!("lamp"), json!(12.5), Value::Null, json!(true)],
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let row = conn
            .fetch_optional("SELECT * FROM items WHERE name = ?", &[json!("lamp")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&json!(1)));
        assert_eq!(row.get("name"), Some(&json!("lamp")));
        assert_eq!(row.get("price"), Some(&json!(12.5)));
        assert_eq!(row.get("note"), Some(&Value::Null));
        assert_eq!(row.get("in_stock"), Some(&json!(true)));
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec!["id", "name", "price", "note", "in_stock"]
        );

        let none = conn
            .fetch_optional("SELECT * FROM items WHERE id = ?", &[json!(99)])
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_failed_decode_is_an_error() {
        let mut conn = memory_connection().await;
        conn.execute("CREATE TABLE notes (body TEXT)", &[])
            .await
            .unwrap();
        conn.execute("INSERT INTO notes (body) VALUES (CAST(x'ff' AS TEXT))", &[])
            .await
            .unwrap();

        let err = conn.fetch_all("SELECT body FROM notes", &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)), "{err}");
    }
}
