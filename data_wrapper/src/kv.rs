//! Record CRUD over Redis
//!
//! Records are stored as JSON strings under `{prefix}:{table}:record:{id}`. Records
//! stored without an identity get the next value of the `{prefix}:{table}:seq`
//! counter.

use crate::envelope::{ResultCode, ResultEnvelope, Stored};
use crate::errors::WrapperError;
use crate::record::{identity, Record};
use crate::wrapper::batch_failure;
use backend::{ConnectionHandle, ConnectionSource, ManageConnection};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

pub struct KeyValueWrapper<'a, S> {
    source: &'a S,
    prefix: String,
}

impl<'a, S> KeyValueWrapper<'a, S>
where
    S: ConnectionSource,
    S::Manager: ManageConnection<Connection = MultiplexedConnection>,
{
    pub fn new(source: &'a S, prefix: &str) -> Self {
        Self {
            source,
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn acquire(&self) -> Result<ConnectionHandle<S::Manager>, WrapperError> {
        self.source
            .acquire()
            .await
            .map_err(WrapperError::Connection)
    }

    fn table<R: Record>(record: &R) -> String {
        match record.schema_name() {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, record.table_name()),
            _ => record.table_name().to_string(),
        }
    }

    pub fn record_key<R: Record>(&self, record: &R, id: &Value) -> String {
        let id = match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        format!("{}:{}:record:{}", self.prefix, Self::table(record), id)
    }

    pub fn sequence_key<R: Record>(&self, record: &R) -> String {
        format!("{}:{}:seq", self.prefix, Self::table(record))
    }

    pub async fn get_one<R: Record>(&self, record: &R) -> Result<ResultEnvelope<R>, WrapperError> {
        if record.id_key().is_none_or(str::is_empty) {
            return Ok(ResultEnvelope::fail(
                ResultCode::MissingIdentity,
                "Id key is not provided",
            ));
        }
        let Some(id) = record.id() else {
            return Ok(ResultEnvelope::fail(
                ResultCode::MissingIdentity,
                "Id value is not provided",
            ));
        };
        self.fetch(record, &id).await
    }

    /// Only the identity column addresses a key-value record
    pub async fn get_by_key<R: Record>(
        &self,
        record: &R,
        key: &str,
        value: Value,
    ) -> Result<ResultEnvelope<R>, WrapperError> {
        if record.id_key() != Some(key) {
            return Err(WrapperError::Unsupported(format!(
                "key-value records can only be looked up by their identity, not by '{}'",
                key
            )));
        }
        self.fetch(record, &value).await
    }

    async fn fetch<R: Record>(&self, record: &R, id: &Value) -> Result<ResultEnvelope<R>, WrapperError> {
        let key = self.record_key(record, id);
        let mut handle = self.acquire().await?;
        let conn: &mut MultiplexedConnection = &mut handle;

        debug!(key = %key, "GET");
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(json) => Ok(ResultEnvelope::ok(serde_json::from_str(&json)?)),
            None => Ok(ResultEnvelope::not_found()),
        }
    }

    /// Write the record, allocating an identity first when it has none
    pub async fn store<R: Record>(&self, record: &mut R) -> Result<ResultEnvelope<Stored>, WrapperError> {
        match self.store_record(record).await? {
            Some(stored) => Ok(ResultEnvelope::ok(stored)),
            None => Ok(ResultEnvelope::fail(
                ResultCode::NothingToWrite,
                "No data to store",
            )),
        }
    }

    /// Write each record. Records without an identity key or data are skipped
    /// without a status, and a failing record gets a failed status while the
    /// batch goes on.
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
        if record.id_key().is_none_or(str::is_empty) || record.store_data().is_empty() {
            return Ok(None);
        }

        let mut handle = self.acquire().await?;
        let conn: &mut MultiplexedConnection = &mut handle;

        let id = match record.id() {
            Some(id) => id,
            None => {
                let seq_key = self.sequence_key(&*record);
                let next: i64 = conn.incr(&seq_key, 1).await?;
                let id = Value::from(next);
                record.set_id(id.clone())?;
                id
            }
        };

        let key = self.record_key(&*record, &id);
        let json = serde_json::to_string(&*record)?;
        debug!(key = %key, "SET");
        let _: () = conn.set(&key, json).await?;

        Ok(Some(Stored {
            id,
            rows_affected: 1,
        }))
    }

    /// Merge the record's update data into the stored value
    pub async fn update<R: Record>(&self, record: &R) -> Result<ResultEnvelope<u64>, WrapperError> {
        match self.update_record(record).await? {
            Some(affected) => Ok(ResultEnvelope::ok(affected)),
            None => Ok(ResultEnvelope::fail(
                ResultCode::NothingToWrite,
                "No data to update",
            )),
        }
    }

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
        let Some((_, id)) = identity(record) else {
            return Ok(None);
        };
        if data.is_empty() {
            return Ok(None);
        }

        let key = self.record_key(record, &id);
        let mut handle = self.acquire().await?;
        let conn: &mut MultiplexedConnection = &mut handle;

        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(Some(0));
        };

        let mut stored = match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        stored.extend(data);

        debug!(key = %key, "SET (merge)");
        let _: () = conn.set(&key, Value::Object(stored).to_string()).await?;
        Ok(Some(1))
    }

    pub async fn delete<R: Record>(&self, record: &R) -> Result<ResultEnvelope<u64>, WrapperError> {
        match self.delete_record(record).await? {
            Some(deleted) => Ok(ResultEnvelope::ok(deleted)),
            None => Ok(ResultEnvelope::fail(
                ResultCode::NothingToDelete,
                "No data to delete",
            )),
        }
    }

    pub async fn delete_many<R: Record>(
        &self,
        records: &[R],
    ) -> Result<Vec<ResultEnvelope<u64>>, WrapperError> {
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            match self.delete_record(record).await {
                Ok(Some(deleted)) => statuses.push(ResultEnvelope::ok(deleted)),
                Ok(None) => {}
                Err(e) => statuses.push(batch_failure(e)?),
            }
        }
        Ok(statuses)
    }

    async fn delete_record<R: Record>(&self, record: &R) -> Result<Option<u64>, WrapperError> {
        let Some((_, id)) = identity(record) else {
            return Ok(None);
        };

        let key = self.record_key(record, &id);
        let mut handle = self.acquire().await?;
        let conn: &mut MultiplexedConnection = &mut handle;

        debug!(key = %key, "DEL");
        let deleted: u64 = conn.del(&key).await?;
        Ok(Some(deleted))
    }
}
