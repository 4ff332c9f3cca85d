//! Convenience re-exports for common dbwrap usage
//!
//! ```rust
//! use dbwrap::prelude::*;
//! ```

pub use crate::core::DbWrap;
pub use crate::errors::DbWrapError;

pub use config::{AppConfig, BackendConfig, BackendKind, PoolConfig, SslMode};

pub use backend::prelude::*;
pub use data_wrapper::prelude::*;
pub use query_builder::prelude::*;

pub use async_trait;
pub use tokio;
