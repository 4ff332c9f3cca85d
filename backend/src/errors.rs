use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("SQL driver error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("PostgreSQL driver error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("MSSQL driver error: {0}")]
    MsSql(#[from] tiberius::error::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend '{0}' is shutting down")]
    ShuttingDown(String),

    #[error("No healthy connection to '{instance}' after {attempts} attempts: {last}")]
    Exhausted {
        instance: String,
        attempts: u32,
        #[source]
        last: Box<BackendError>,
    },

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Cannot bind parameter: {0}")]
    Bind(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Whether the error means the connection (or the pool) is unusable, as
    /// opposed to a statement the server rejected
    pub fn is_connection_error(&self) -> bool {
        match self {
            BackendError::Timeout(_)
            | BackendError::ShuttingDown(_)
            | BackendError::Exhausted { .. }
            | BackendError::HealthCheck(_)
            | BackendError::Pool(_)
            | BackendError::Io(_) => true,
            BackendError::Postgres(e) => {
                e.is_closed()
                    || std::error::Error::source(e).is_some_and(|cause| cause.is::<std::io::Error>())
            }
            BackendError::Sql(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed
            ),
            BackendError::MsSql(e) => matches!(
                e,
                tiberius::error::Error::Io { .. }
                    | tiberius::error::Error::Tls(_)
                    | tiberius::error::Error::Routing { .. }
            ),
            BackendError::Redis(e) => {
                e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
            }
            BackendError::Config(_)
            | BackendError::Bind(_)
            | BackendError::Decode(_)
            | BackendError::Unsupported(_) => false,
        }
    }
}
