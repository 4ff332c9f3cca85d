use backend::BackendError;
use query_builder::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WrapperError {
    /// No healthy connection could be obtained, or it failed mid-statement
    #[error("Connection error: {0}")]
    Connection(#[source] BackendError),

    /// The request could not be turned into a statement
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// The backend rejected the statement
    #[error("Execution error: {0}")]
    Execution(#[source] BackendError),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<BackendError> for WrapperError {
    fn from(e: BackendError) -> Self {
        if e.is_connection_error() {
            WrapperError::Connection(e)
        } else {
            WrapperError::Execution(e)
        }
    }
}

impl From<redis::RedisError> for WrapperError {
    fn from(e: redis::RedisError) -> Self {
        BackendError::from(e).into()
    }
}

impl WrapperError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, WrapperError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backend_errors_are_classified() {
        let err = WrapperError::from(BackendError::Timeout(Duration::from_secs(5)));
        assert!(err.is_connection_error());

        let err = WrapperError::from(BackendError::Decode("bad row".into()));
        assert!(matches!(err, WrapperError::Execution(_)));
    }

    #[test]
    fn test_query_errors_convert() {
        let err: WrapperError = QueryError::EmptyIdentifier.into();
        assert!(matches!(err, WrapperError::Query(QueryError::EmptyIdentifier)));
        assert!(!err.is_connection_error());
    }
}
