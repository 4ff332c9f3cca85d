//! Engine specific connection managers
//!
//! - [`sql::SqlManager`]: PostgreSQL through tokio-postgres, MySQL and SQLite
//!   through sqlx
//! - [`mssql::MsSqlManager`]: SQL Server through tiberius over a socket we dial
//! - [`redis::RedisManager`]: Redis multiplexed connections

pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod redis;
pub mod sql;
pub mod sqlite;

use crate::errors::BackendError;
use config::{BackendConfig, BackendKind, ConfigError};

pub(crate) fn expect_kind(config: &BackendConfig, kinds: &[BackendKind]) -> Result<(), BackendError> {
    if kinds.contains(&config.kind) {
        Ok(())
    } else {
        Err(BackendError::Config(ConfigError::Invalid(format!(
            "Backend '{}': {} is not handled by this connection manager",
            config.instance_name, config.kind
        ))))
    }
}
