//! CRUD over any SQL connection source
//!
//! Each operation acquires its own handle, builds the statement for the dialect the
//! connection speaks, logs it, runs it and lets the handle go back to its owner.
//! Errors surface as [`WrapperError`]; soft outcomes live in the envelope.

use crate::envelope::{ResultCode, ResultEnvelope, Stored};
use crate::errors::WrapperError;
use crate::record::{identity, is_present, Record};
use backend::{BackendError, ConnectionHandle, ConnectionSource, ManageConnection, Session};
use query_builder::{
    CompiledQuery, Dialect, FilterExpression, OrderSpec, Pagination, QueryBuilder,
    ReturningStyle, SqlGenerator,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Data access over a borrowed pool or single connection
pub struct DataAccessWrapper<'a, S> {
    source: &'a S,
}

impl<S> Clone for DataAccessWrapper<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for DataAccessWrapper<'_, S> {}

impl<'a, S> DataAccessWrapper<'a, S>
where
    S: ConnectionSource,
    <S::Manager as ManageConnection>::Connection: Session,
{
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    async fn acquire(&self) -> Result<ConnectionHandle<S::Manager>, WrapperError> {
        self.source
            .acquire()
            .await
            .map_err(WrapperError::Connection)
    }

    fn select<R: Record>(&self, dialect: Dialect, record: &R) -> QueryBuilder {
        let base = record.query_base();
        QueryBuilder::new(dialect, record.table_name())
            .schema(record.schema_name())
            .alias(record.table_alias())
            .base_query(base.as_deref())
    }

    fn table<R: Record>(dialect: Dialect, record: &R) -> Result<String, WrapperError> {
        Ok(SqlGenerator::table_identifier(
            dialect,
            record.schema_name(),
            record.table_name(),
        )?)
    }

    /// Fetch the record identified by its own identity key and value
    pub async fn get_one<R: Record>(&self, record: &R) -> Result<ResultEnvelope<R>, WrapperError> {
        let Some(key) = record.id_key().filter(|k| !k.is_empty()) else {
            return Ok(ResultEnvelope::fail(
                ResultCode::MissingIdentity,
                "Id key is not provided",
            ));
        };
        let Some(value) = record.id() else {
            return Ok(ResultEnvelope::fail(
                ResultCode::MissingIdentity,
                "Id value is not provided",
            ));
        };
        self.get_by_key(record, key, value).await
    }

    /// Fetch the first row where `key = value`, ignoring the record's own identity
    pub async fn get_by_key<R: Record>(
        &self,
        record: &R,
        key: &str,
        value: Value,
    ) -> Result<ResultEnvelope<R>, WrapperError> {
        let mut conn = self.acquire().await?;
        let builder = self.select(conn.dialect(), record);
        let column = builder.qualified_column(key);
        let query = builder.where_eq(&column, value).build()?;

        log_query(&query);
        let result = conn.fetch_optional(&query.sql, &query.params).await;
        let row = check(&mut conn, result)?;
        drop(conn);

        match row {
            Some(row) => Ok(ResultEnvelope::ok(R::from_row(row)?)),
            None => Ok(ResultEnvelope::not_found()),
        }
    }

    /// All rows, optionally narrowed by one equality condition, ordered and paginated.
    /// A limit of zero returns the whole result set.
    pub async fn get_all<R: Record>(
        &self,
        record: &R,
        filter: Option<(&str, Value)>,
        order: Option<&OrderSpec>,
        pagination: Pagination,
    ) -> Result<ResultEnvelope<Vec<R>>, WrapperError> {
        let mut conn = self.acquire().await?;
        let mut builder = self.select(conn.dialect(), record).pagination(pagination);
        if let Some((key, value)) = filter.filter(|(k, v)| !k.is_empty() && is_present(v)) {
            let column = builder.qualified_column(key);
            builder = builder.where_eq(&column, value);
        }
        if let Some(order) = order {
            builder = builder.order(order.clone());
        }

        self.fetch_records(&mut conn, &builder.build()?).await
    }

    /// Rows matching a filter expression, ordered and paginated
    pub async fn get_filtered<R: Record>(
        &self,
        record: &R,
        filter: &FilterExpression,
        order: Option<&OrderSpec>,
        pagination: Pagination,
    ) -> Result<ResultEnvelope<Vec<R>>, WrapperError> {
        let mut conn = self.acquire().await?;
        let mut builder = self
            .select(conn.dialect(), record)
            .filter(filter.clone())
            .pagination(pagination);
        if let Some(order) = order {
            builder = builder.order(order.clone());
        }

        self.fetch_records(&mut conn, &builder.build()?).await
    }

    async fn fetch_records<R: Record>(
        &self,
        conn: &mut ConnectionHandle<S::Manager>,
        query: &CompiledQuery,
    ) -> Result<ResultEnvelope<Vec<R>>, WrapperError> {
        log_query(query);
        let result = conn.fetch_all(&query.sql, &query.params).await;
        let rows = check(conn, result)?;
        if rows.is_empty() {
            return Ok(ResultEnvelope::not_found());
        }

        let records = rows
            .into_iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResultEnvelope::ok(records))
    }

    /// Insert one record and write the generated identity back into it
    pub async fn store<R: Record>(
        &self,
        record: &mut R,
    ) -> Result<ResultEnvelope<Stored>, WrapperError> {
        match self.store_record(record).await? {
            Some(stored) => Ok(ResultEnvelope::ok(stored)),
            None => Ok(ResultEnvelope::fail(
                ResultCode::NothingToWrite,
                "No data to store",
            )),
        }
    }

    /// Insert each record. Records without an identity key or data are skipped
    /// without a status; a failing record gets a failed status and the batch
    /// goes on. Only connection failures abort the batch.
    pub async fn store_many<R: Record>(
        &self,
        records: &mut [R],
    ) -> Result<Vec<ResultEnvelope<Stored>>, WrapperError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            match self.store_record(record).await {
                Ok(Some(stored)) => statuses.push(ResultEnvelope::ok(stored)),
                Ok(None) => {}
                Err(e) => statuses.push(batch_failure(e)?),
            }
        }
        Ok(statuses)
    }

    async fn store_record<R: Record>(&self, record: &mut R) -> Result<Option<Stored>, WrapperError> {
        let Some(key) = record.id_key().filter(|k| !k.is_empty()).map(str::to_string) else {
            return Ok(None);
        };
        let data = record.store_data();
        if data.is_empty() {
            return Ok(None);
        }

        let mut conn = self.acquire().await?;
        let dialect = conn.dialect();
        let table = Self::table(dialect, &*record)?;
        let query = SqlGenerator::build_insert(dialect, &table, &key, &data)?;
        log_query(&query);

        let stored = match dialect.returning_style() {
            ReturningStyle::Returning | ReturningStyle::Output => {
                // Drain the statement so the insert completes before the handle is reused
                let result = conn.fetch_all(&query.sql, &query.params).await;
                let row = check(&mut conn, result)?.into_iter().next();
                Stored {
                    rows_affected: u64::from(row.is_some()),
                    id: row
                        .and_then(|row| row.get(&key).cloned())
                        .unwrap_or(Value::Null),
                }
            }
            ReturningStyle::LastInsertId => {
                let result = conn.execute(&query.sql, &query.params).await;
                let outcome = check(&mut conn, result)?;
                Stored {
                    rows_affected: outcome.rows_affected,
                    id: outcome.last_insert_id.map(Value::from).unwrap_or(Value::Null),
                }
            }
        };
        drop(conn);

        if is_present(&stored.id) {
            record.set_id(stored.id.clone())?;
        }
        Ok(Some(stored))
    }

    /// Update one record by its identity, returning the affected row count
    pub async fn update<R: Record>(&self, record: &R) -> Result<ResultEnvelope<u64>, WrapperError> {
        match self.update_record(record).await? {
            Some(affected) => Ok(ResultEnvelope::ok(affected)),
            None => Ok(ResultEnvelope::fail(
                ResultCode::NothingToWrite,
                "No data to update",
            )),
        }
    }

    /// Update each record; skipping and failure rules match [`store_many`](Self::store_many)
    pub async fn update_many<R: Record>(
        &self,
        records: &[R],
    ) -> Result<Vec<ResultEnvelope<u64>>, WrapperError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            match self.update_record(record).await {
                Ok(Some(affected)) => statuses.push(ResultEnvelope::ok(affected)),
                Ok(None) => {}
                Err(e) => statuses.push(batch_failure(e)?),
            }
        }
        Ok(statuses)
    }

    async fn update_record<R: Record>(&self, record: &R) -> Result<Option<u64>, WrapperError> {
        let data = record.update_data();
        let Some((key, value)) = identity(record) else {
            return Ok(None);
        };
        if data.is_empty() {
            return Ok(None);
        }
        self.run_update(record, &data, &key, &value).await.map(Some)
    }

    /// Update an arbitrary set of columns of the record's table. The row is
    /// addressed by `key` when given, otherwise by the record's identity.
    pub async fn update_fields<R: Record>(
        &self,
        record: &R,
        data: &Map<String, Value>,
        key: Option<(&str, Value)>,
    ) -> Result<ResultEnvelope<u64>, WrapperError> {
        let target = match key {
            Some((column, value)) if !column.is_empty() && is_present(&value) => {
                Some((column.to_string(), value))
            }
            _ => identity(record),
        };
        let Some((column, value)) = target else {
            return Ok(ResultEnvelope::fail(
                ResultCode::MissingIdentity,
                "Id key or value is not provided",
            ));
        };
        if data.is_empty() {
            return Ok(ResultEnvelope::fail(
                ResultCode::NothingToWrite,
                "No data to update",
            ));
        }

        let affected = self.run_update(record, data, &column, &value).await?;
        Ok(ResultEnvelope::ok(affected))
    }

    async fn run_update<R: Record>(
        &self,
        record: &R,
        data: &Map<String, Value>,
        key: &str,
        value: &Value,
    ) -> Result<u64, WrapperError> {
        let mut conn = self.acquire().await?;
        let dialect = conn.dialect();
        let table = Self::table(dialect, record)?;
        let query = SqlGenerator::build_update(dialect, &table, data, key, value)?;

        log_query(&query);
        let result = conn.execute(&query.sql, &query.params).await;
        Ok(check(&mut conn, result)?.rows_affected)
    }

    /// Delete one record by its identity, returning the affected row count
    pub async fn delete<R: Record>(&self, record: &R) -> Result<ResultEnvelope<u64>, WrapperError> {
        match self.delete_record(record).await? {
            Some(affected) => Ok(ResultEnvelope::ok(affected)),
            None => Ok(ResultEnvelope::fail(
                ResultCode::NothingToDelete,
                "No data to delete",
            )),
        }
    }

    /// Delete each record; skipping and failure rules match [`store_many`](Self::store_many)
    pub async fn delete_many<R: Record>(
        &self,
        records: &[R],
    ) -> Result<Vec<ResultEnvelope<u64>>, WrapperError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            match self.delete_record(record).await {
                Ok(Some(affected)) => statuses.push(ResultEnvelope::ok(affected)),
                Ok(None) => {}
                Err(e) => statuses.push(batch_failure(e)?),
            }
        }
        Ok(statuses)
    }

    async fn delete_record<R: Record>(&self, record: &R) -> Result<Option<u64>, WrapperError> {
        let Some((key, value)) = identity(record) else {
            return Ok(None);
        };

        let mut conn = self.acquire().await?;
        let dialect = conn.dialect();
        let table = Self::table(dialect, record)?;
        let query = SqlGenerator::build_delete(dialect, &table, &key, &value)?;

        log_query(&query);
        let result = conn.execute(&query.sql, &query.params).await;
        Ok(Some(check(&mut conn, result)?.rows_affected))
    }

    /// Run a caller supplied statement and return its rows
    pub async fn fetch_raw(&self, sql: &str, params: &[Value]) -> Result<Vec<backend::Row>, WrapperError> {
        let mut conn = self.acquire().await?;
        debug!(query = %sql, params = ?params, "Executing query");
        let result = conn.fetch_all(sql, params).await;
        check(&mut conn, result)
    }

    /// Run a caller supplied statement and return the affected row count
    pub async fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<u64, WrapperError> {
        let mut conn = self.acquire().await?;
        debug!(query = %sql, params = ?params, "Executing query");
        let result = conn.execute(sql, params).await;
        Ok(check(&mut conn, result)?.rows_affected)
    }
}

/// Mark the handle broken when the connection itself failed, so it is not reused
fn check<M, T>(conn: &mut ConnectionHandle<M>, result: Result<T, BackendError>) -> Result<T, WrapperError>
where
    M: ManageConnection,
{
    result.map_err(|e| {
        if e.is_connection_error() {
            conn.mark_broken();
        }
        WrapperError::from(e)
    })
}

fn log_query(query: &CompiledQuery) {
    debug!(query = %query.sql, params = ?query.params, "Executing query");
}

/// Status for a batch record that failed; connection failures end the batch
pub(crate) fn batch_failure<T>(e: WrapperError) -> Result<ResultEnvelope<T>, WrapperError> {
    if e.is_connection_error() {
        return Err(e);
    }
    warn!(error = %e, "Batch record failed");
    Ok(ResultEnvelope::fail(ResultCode::RecordFailed, e.to_string()))
}
