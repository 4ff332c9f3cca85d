//! Uniform result envelope
//!
//! Every CRUD call reports through a [`ResultEnvelope`]. Soft conditions such as a
//! missing row or a record with nothing to write are failures inside the envelope,
//! never errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Machine readable reason attached to an unsuccessful envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ResultCode {
    /// Identity key or value not provided
    MissingIdentity,
    NotFound,
    /// No record had anything to store or update
    NothingToWrite,
    NothingToDelete,
    /// One record of a batch failed while executing
    RecordFailed,
}

impl ResultCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ResultCode::MissingIdentity => 10000,
            ResultCode::NotFound => 10001,
            ResultCode::NothingToWrite => 10002,
            ResultCode::NothingToDelete => 10003,
            ResultCode::RecordFailed => 10004,
        }
    }
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            10000 => Ok(ResultCode::MissingIdentity),
            10001 => Ok(ResultCode::NotFound),
            10002 => Ok(ResultCode::NothingToWrite),
            10003 => Ok(ResultCode::NothingToDelete),
            10004 => Ok(ResultCode::RecordFailed),
            other => Err(format!("unknown result code {}", other)),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<T> {
    pub success: bool,
    pub result: Option<T>,
    pub message: Option<String>,
    pub code: Option<ResultCode>,
    pub info: Option<Value>,
}

impl<T> ResultEnvelope<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            message: None,
            code: None,
            info: None,
        }
    }

    pub fn fail(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            message: Some(message.into()),
            code: Some(code),
            info: None,
        }
    }

    pub fn not_found() -> Self {
        Self::fail(ResultCode::NotFound, "Data not found")
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Some(ResultCode::NotFound)
    }

    /// The result of a successful envelope
    pub fn into_result(self) -> Option<T> {
        if self.success {
            self.result
        } else {
            None
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultEnvelope<U> {
        ResultEnvelope {
            success: self.success,
            result: self.result.map(f),
            message: self.message,
            code: self.code,
            info: self.info,
        }
    }
}

impl<T: fmt::Debug> fmt::Display for ResultEnvelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success: {} | code: {} | message: {} | result: {:?}",
            self.success,
            self.code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
            self.message.as_deref().unwrap_or("-"),
            self.result
        )
    }
}

/// What a successful insert reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored {
    /// Identity assigned by the backend, `null` when the backend reported none
    pub id: Value,
    pub rows_affected: u64,
}
