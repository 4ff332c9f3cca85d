//! Error types for the dbwrap crate
//!
//! Lower layers keep their own error enums; [`DbWrapError`] wraps them and adds the
//! failures of looking backends up by name.

use backend::BackendError;
use config::{BackendKind, ConfigError};
use data_wrapper::WrapperError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbWrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Data access error: {0}")]
    Wrapper(#[from] WrapperError),

    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    #[error("Backend already registered: {0}")]
    BackendAlreadyRegistered(String),

    #[error("Backend '{name}' is {actual}, expected {expected}")]
    WrongKind {
        name: String,
        actual: BackendKind,
        expected: &'static str,
    },
}
