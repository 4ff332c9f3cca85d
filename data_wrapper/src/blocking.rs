//! Blocking execution model
//!
//! [`Database`] owns a current-thread runtime and one dedicated
//! [`BackendConnection`], and runs every wrapper call to completion on the calling
//! thread. It must not be used from inside an async runtime.

use crate::envelope::{ResultEnvelope, Stored};
use crate::errors::WrapperError;
use crate::record::Record;
use crate::wrapper::DataAccessWrapper;
use backend::drivers::sql::SqlManager;
use backend::{BackendConnection, LifecycleState, ManageConnection, PoolOptions, Session};
use config::BackendConfig;
use query_builder::{FilterExpression, OrderSpec, Pagination};
use serde_json::{Map, Value};
use tokio::runtime::{Builder, Runtime};

pub struct Database<M: ManageConnection> {
    runtime: Runtime,
    connection: BackendConnection<M>,
}

impl Database<SqlManager> {
    /// Single connection to a PostgreSQL, MySQL or SQLite backend
    pub fn connect(config: BackendConfig) -> Result<Self, WrapperError> {
        let options = PoolOptions::from_config(&config);
        let name = config.instance_name.clone();
        let manager = SqlManager::new(config).map_err(WrapperError::Execution)?;
        let database = Self::new(&name, manager, options)?;
        database.open()?;
        Ok(database)
    }
}

impl<M> Database<M>
where
    M: ManageConnection,
    M::Connection: Session,
{
    /// Build the runtime; the connection is made by [`open`](Self::open) or the
    /// first call
    pub fn new(name: &str, manager: M, options: PoolOptions) -> Result<Self, WrapperError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            connection: BackendConnection::new(name, manager, options)
                .map_err(WrapperError::Connection)?,
        })
    }

    pub fn connection(&self) -> &BackendConnection<M> {
        &self.connection
    }

    pub fn state(&self) -> LifecycleState {
        self.connection.state()
    }

    pub fn open(&self) -> Result<(), WrapperError> {
        self.runtime
            .block_on(self.connection.open())
            .map_err(WrapperError::Connection)
    }

    /// Idempotent
    pub fn close(&self) {
        self.runtime.block_on(self.connection.close());
    }

    fn wrapper(&self) -> DataAccessWrapper<'_, BackendConnection<M>> {
        DataAccessWrapper::new(&self.connection)
    }

    pub fn get_one<R: Record>(&self, record: &R) -> Result<ResultEnvelope<R>, WrapperError> {
        self.runtime.block_on(self.wrapper().get_one(record))
    }

    pub fn get_by_key<R: Record>(
        &self,
        record: &R,
        key: &str,
        value: Value,
    ) -> Result<ResultEnvelope<R>, WrapperError> {
        self.runtime.block_on(self.wrapper().get_by_key(record, key, value))
    }

    pub fn get_all<R: Record>(
        &self,
        record: &R,
        filter: Option<(&str, Value)>,
        order: Option<&OrderSpec>,
        pagination: Pagination,
    ) -> Result<ResultEnvelope<Vec<R>>, WrapperError> {
        self.runtime
            .block_on(self.wrapper().get_all(record, filter, order, pagination))
    }

    pub fn get_filtered<R: Record>(
        &self,
        record: &R,
        filter: &FilterExpression,
        order: Option<&OrderSpec>,
        pagination: Pagination,
    ) -> Result<ResultEnvelope<Vec<R>>, WrapperError> {
        self.runtime
            .block_on(self.wrapper().get_filtered(record, filter, order, pagination))
    }

    pub fn store<R: Record>(&self, record: &mut R) -> Result<ResultEnvelope<Stored>, WrapperError> {
        self.runtime.block_on(self.wrapper().store(record))
    }

    pub fn store_many<R: Record>(
        &self,
        records: &mut [R],
    ) -> Result<Vec<ResultEnvelope<Stored>>, WrapperError> {
        self.runtime.block_on(self.wrapper().store_many(records))
    }

    pub fn update<R: Record>(&self, record: &R) -> Result<ResultEnvelope<u64>, WrapperError> {
        self.runtime.block_on(self.wrapper().update(record))
    }

    pub fn update_many<R: Record>(&self, records: &[R]) -> Result<Vec<ResultEnvelope<u64>>, WrapperError> {
        self.runtime.block_on(self.wrapper().update_many(records))
    }

    pub fn update_fields<R: Record>(
        &self,
        record: &R,
        data: &Map<String, Value>,
        key: Option<(&str, Value)>,
    ) -> Result<ResultEnvelope<u64>, WrapperError> {
        self.runtime
            .block_on(self.wrapper().update_fields(record, data, key))
    }

    pub fn delete<R: Record>(&self, record: &R) -> Result<ResultEnvelope<u64>, WrapperError> {
        self.runtime.block_on(self.wrapper().delete(record))
    }

    pub fn delete_many<R: Record>(&self, records: &[R]) -> Result<Vec<ResultEnvelope<u64>>, WrapperError> {
        self.runtime.block_on(self.wrapper().delete_many(records))
    }

    pub fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<u64, WrapperError> {
        self.runtime.block_on(self.wrapper().execute_raw(sql, params))
    }
}
