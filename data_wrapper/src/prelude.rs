//! Convenience re-exports for common data wrapper usage

pub use crate::blocking::Database;
pub use crate::envelope::{ResultCode, ResultEnvelope, Stored};
pub use crate::errors::WrapperError;
pub use crate::kv::KeyValueWrapper;
pub use crate::record::Record;
pub use crate::wrapper::DataAccessWrapper;

pub use query_builder::{FilterExpression, OrderSpec, Pagination, SortOrder};
