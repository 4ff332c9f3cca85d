//! # Backend connections for dbwrap
//!
//! Connection lifecycle for every supported engine behind one contract:
//!
//! - [`ManageConnection`] knows how to connect, tune, check and close one kind of
//!   physical connection.
//! - [`ConnectionPool`] keeps a bounded deadpool of those connections and hands
//!   them out with a health check and a fixed-backoff retry loop.
//! - [`BackendConnection`] is the single-connection variant used by the blocking API.
//! - [`Session`] is what callers run statements through once they hold a
//!   [`ConnectionHandle`].
//!
//! Handles return their connection when dropped, so a connection goes back to its
//! owner on every exit path of the code that borrowed it.

pub mod connection;
mod decode;
pub mod drivers;
pub mod errors;
pub mod manager;
pub mod pool;
pub mod prelude;
pub mod session;
pub mod socket;
pub mod state;
mod values;

pub use connection::{BackendConnection, ConnectionHandle, ConnectionSource};
pub use errors::BackendError;
pub use manager::ManageConnection;
pub use pool::{ConnectionPool, PoolOptions, PoolStatus};
pub use session::{ExecOutcome, Row, Session};
pub use socket::SocketTuning;
pub use state::LifecycleState;
