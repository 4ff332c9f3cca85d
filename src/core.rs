//! Core dbwrap functionality
//!
//! [`DbWrap`] is the composition root: it owns one connection pool per configured
//! backend and lends wrappers that borrow those pools.

use std::collections::BTreeMap;

use backend::drivers::mssql::MsSqlManager;
use backend::drivers::redis::RedisManager;
use backend::drivers::sql::SqlManager;
use backend::{ConnectionPool, LifecycleState, PoolOptions, PoolStatus};
use config::{AppConfig, BackendConfig, BackendKind};
use data_wrapper::{DataAccessWrapper, KeyValueWrapper};
use tracing::{debug, warn};

use crate::errors::DbWrapError;

enum Registered {
    Sql(ConnectionPool<SqlManager>),
    MsSql(ConnectionPool<MsSqlManager>),
    Redis(ConnectionPool<RedisManager>),
}

impl Registered {
    fn kind(&self) -> BackendKind {
        match self {
            Registered::Sql(pool) => pool.manager().config().kind,
            Registered::MsSql(pool) => pool.manager().config().kind,
            Registered::Redis(pool) => pool.manager().config().kind,
        }
    }

    async fn open(&self) -> Result<(), DbWrapError> {
        match self {
            Registered::Sql(pool) => pool.open_pool().await?,
            Registered::MsSql(pool) => pool.open_pool().await?,
            Registered::Redis(pool) => pool.open_pool().await?,
        }
        Ok(())
    }

    async fn close(&self) {
        match self {
            Registered::Sql(pool) => pool.close_pool().await,
            Registered::MsSql(pool) => pool.close_pool().await,
            Registered::Redis(pool) => pool.close_pool().await,
        }
    }

    async fn check_health(&self) -> Result<(), DbWrapError> {
        // Acquiring runs the backend's health check
        match self {
            Registered::Sql(pool) => drop(pool.acquire().await?),
            Registered::MsSql(pool) => drop(pool.acquire().await?),
            Registered::Redis(pool) => drop(pool.acquire().await?),
        }
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        match self {
            Registered::Sql(pool) => pool.status(),
            Registered::MsSql(pool) => pool.status(),
            Registered::Redis(pool) => pool.status(),
        }
    }
}

/// Named backends built from configuration
pub struct DbWrap {
    backends: BTreeMap<String, Registered>,
}

impl DbWrap {
    /// Build a pool for every configured backend. Nothing connects until
    /// [`open_all`](Self::open_all) or the first acquisition.
    pub fn new(config: &AppConfig) -> Result<Self, DbWrapError> {
        let mut dbwrap = Self::empty();
        for (name, backend) in &config.backends {
            dbwrap.register(name, backend.clone())?;
        }
        Ok(dbwrap)
    }

    /// Build from the configuration file named by `DBWRAP_CONFIG` or `./dbwrap.toml`
    pub fn from_env() -> Result<Self, DbWrapError> {
        let config = AppConfig::load()?;
        Self::new(&config)
    }

    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// Register one backend under `name`
    pub fn register(&mut self, name: &str, config: BackendConfig) -> Result<(), DbWrapError> {
        if self.backends.contains_key(name) {
            return Err(DbWrapError::BackendAlreadyRegistered(name.to_string()));
        }
        config.validate()?;

        let options = PoolOptions::from_config(&config);
        let kind = config.kind;
        let registered = match kind {
            BackendKind::Postgres | BackendKind::MySql | BackendKind::Sqlite => {
                Registered::Sql(ConnectionPool::new(name, SqlManager::new(config)?, options)?)
            }
            BackendKind::MsSql => {
                Registered::MsSql(ConnectionPool::new(name, MsSqlManager::new(config)?, options)?)
            }
            BackendKind::Redis => {
                Registered::Redis(ConnectionPool::new(name, RedisManager::new(config)?, options)?)
            }
        };

        debug!(backend = %name, kind = %registered.kind(), "Backend registered");
        self.backends.insert(name.to_string(), registered);
        Ok(())
    }

    /// Close and forget a backend
    pub async fn unregister(&mut self, name: &str) -> Result<(), DbWrapError> {
        let registered = self
            .backends
            .remove(name)
            .ok_or_else(|| DbWrapError::BackendNotFound(name.to_string()))?;
        registered.close().await;
        Ok(())
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn kind(&self, name: &str) -> Result<BackendKind, DbWrapError> {
        Ok(self.lookup(name)?.kind())
    }

    /// Open every pool and warm up its minimum connections
    pub async fn open_all(&self) -> Result<(), DbWrapError> {
        for (name, registered) in &self.backends {
            if let Err(e) = registered.open().await {
                warn!(backend = %name, error = %e, "Failed to open backend");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Close every pool. Idempotent.
    pub async fn close_all(&self) {
        for registered in self.backends.values() {
            registered.close().await;
        }
        debug!(backends = self.backends.len(), "All backends closed");
    }

    /// Acquire and return one connection, which runs the backend's health check
    pub async fn health_check(&self, name: &str) -> Result<(), DbWrapError> {
        self.lookup(name)?.check_health().await
    }

    pub fn status(&self) -> BTreeMap<String, PoolStatus> {
        self.backends
            .iter()
            .map(|(name, registered)| (name.clone(), registered.status()))
            .collect()
    }

    /// True when every pool has been opened and none is shutting down
    pub fn is_open(&self) -> bool {
        self.backends
            .values()
            .all(|registered| registered.status().state == LifecycleState::Open)
    }

    fn lookup(&self, name: &str) -> Result<&Registered, DbWrapError> {
        self.backends
            .get(name)
            .ok_or_else(|| DbWrapError::BackendNotFound(name.to_string()))
    }

    fn wrong_kind(name: &str, registered: &Registered, expected: &'static str) -> DbWrapError {
        DbWrapError::WrongKind {
            name: name.to_string(),
            actual: registered.kind(),
            expected,
        }
    }

    /// Pool of a PostgreSQL, MySQL or SQLite backend
    pub fn sql_pool(&self, name: &str) -> Result<&ConnectionPool<SqlManager>, DbWrapError> {
        match self.lookup(name)? {
            Registered::Sql(pool) => Ok(pool),
            other => Err(Self::wrong_kind(name, other, "postgres, mysql or sqlite")),
        }
    }

    pub fn mssql_pool(&self, name: &str) -> Result<&ConnectionPool<MsSqlManager>, DbWrapError> {
        match self.lookup(name)? {
            Registered::MsSql(pool) => Ok(pool),
            other => Err(Self::wrong_kind(name, other, "mssql")),
        }
    }

    pub fn redis_pool(&self, name: &str) -> Result<&ConnectionPool<RedisManager>, DbWrapError> {
        match self.lookup(name)? {
            Registered::Redis(pool) => Ok(pool),
            other => Err(Self::wrong_kind(name, other, "redis")),
        }
    }

    /// Data access over a PostgreSQL, MySQL or SQLite backend
    pub fn wrapper(
        &self,
        name: &str,
    ) -> Result<DataAccessWrapper<'_, ConnectionPool<SqlManager>>, DbWrapError> {
        Ok(DataAccessWrapper::new(self.sql_pool(name)?))
    }

    /// Data access over a SQL Server backend
    pub fn mssql_wrapper(
        &self,
        name: &str,
    ) -> Result<DataAccessWrapper<'_, ConnectionPool<MsSqlManager>>, DbWrapError> {
        Ok(DataAccessWrapper::new(self.mssql_pool(name)?))
    }

    /// Key-value records in a Redis backend, under keys starting with `prefix`
    pub fn kv(
        &self,
        name: &str,
        prefix: &str,
    ) -> Result<KeyValueWrapper<'_, ConnectionPool<RedisManager>>, DbWrapError> {
        Ok(KeyValueWrapper::new(self.redis_pool(name)?, prefix))
    }
}
