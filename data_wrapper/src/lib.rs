//! # Data access for dbwrap
//!
//! CRUD orchestration on top of the backend connections:
//!
//! - [`DataAccessWrapper`] runs get/store/update/delete against any SQL
//!   [`ConnectionSource`](backend::ConnectionSource), compiling filters with the
//!   query builder for the connection's dialect.
//! - [`KeyValueWrapper`] offers the same operations for records kept in Redis.
//! - [`blocking::Database`] is the synchronous variant over a single connection.
//!
//! Every operation answers with a [`ResultEnvelope`]. Missing rows and records with
//! nothing to write are reported in the envelope; connection and statement failures
//! are errors.

pub mod blocking;
pub mod envelope;
pub mod errors;
pub mod kv;
pub mod prelude;
pub mod record;
pub mod wrapper;

pub use envelope::{ResultCode, ResultEnvelope, Stored};
pub use errors::WrapperError;
pub use kv::KeyValueWrapper;
pub use record::Record;
pub use wrapper::DataAccessWrapper;
