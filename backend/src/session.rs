//! Statement execution seam
//!
//! Every SQL connection type implements [`Session`], so code holding a
//! [`ConnectionHandle`](crate::ConnectionHandle) runs statements the same way on
//! any engine. Rows come back as ordered JSON objects keyed by column name.

use crate::decode::Lenient;
use crate::errors::BackendError;
use async_trait::async_trait;
use query_builder::Dialect;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new(columns: Map<String, Value>) -> Self {
        Self(columns)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Deserialize the row into a typed value. `bool` fields also accept the
    /// integers `0` and `1`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(Lenient(Value::Object(self.0.clone())))
    }
}

impl From<Map<String, Value>> for Row {
    fn from(columns: Map<String, Value>) -> Self {
        Self(columns)
    }
}

/// What a data-modifying statement reports back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Identity generated by the statement, on drivers that report one
    pub last_insert_id: Option<i64>,
}

#[async_trait]
pub trait Session: Send {
    fn dialect(&self) -> Dialect;

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, BackendError>;

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, BackendError> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, BackendError>;
}
