//! Convenience re-exports for common backend usage

pub use crate::connection::{BackendConnection, ConnectionHandle, ConnectionSource};
pub use crate::drivers::mssql::{MsSqlConnection, MsSqlManager};
pub use crate::drivers::redis::RedisManager;
pub use crate::drivers::postgres::PgConnection;
pub use crate::drivers::sql::{SqlConnection, SqlManager};
pub use crate::errors::BackendError;
pub use crate::manager::ManageConnection;
pub use crate::pool::{ConnectionPool, PoolOptions, PoolStatus};
pub use crate::session::{ExecOutcome, Row, Session};
pub use crate::state::LifecycleState;
