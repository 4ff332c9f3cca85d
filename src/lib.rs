//! # dbwrap
//!
//! Dialect-agnostic data access for PostgreSQL, MySQL, SQLite, SQL Server and Redis.
//!
//! Backends are described in a TOML file, one `[backends.<name>]` table each. [`DbWrap`]
//! builds a connection pool per backend; the wrappers it lends run CRUD operations
//! and answer with a uniform [`ResultEnvelope`](data_wrapper::ResultEnvelope).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbwrap::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct User {
//!     id: Option<i64>,
//!     name: String,
//!     email: String,
//! }
//!
//! impl Record for User {
//!     fn table_name(&self) -> &str {
//!         "users"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dbwrap = DbWrap::from_env()?;
//!     dbwrap.open_all().await?;
//!
//!     let users = dbwrap.wrapper("main")?;
//!     let mut user = User {
//!         name: "John Doe".to_string(),
//!         email: "john@example.com".to_string(),
//!         ..Default::default()
//!     };
//!     users.store(&mut user).await?;
//!
//!     let filter = FilterExpression::new().starts_with("email", "john");
//!     let found = users
//!         .get_filtered(&User::default(), &filter, None, Pagination::default())
//!         .await?;
//!     println!("{}", found);
//!
//!     dbwrap.close_all().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod errors;
pub mod prelude;

pub use self::core::DbWrap;
pub use errors::DbWrapError;

pub use config::{AppConfig, BackendConfig, BackendKind, PoolConfig, SslMode};

// Member crates
pub use backend;
pub use config;
pub use data_wrapper;
pub use query_builder;

// Needed to implement `ManageConnection` outside this workspace
pub use async_trait;
pub use sqlx;
