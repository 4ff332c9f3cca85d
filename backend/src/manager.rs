use crate::errors::BackendError;
use async_trait::async_trait;

/// Knows how to open, prepare, check and close one kind of physical connection.
///
/// Pools and single connections are generic over this trait, so the acquisition
/// algorithm is written once for every engine.
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Target description for logs; never contains credentials
    fn describe(&self) -> String;

    /// Open a new physical connection
    async fn connect(&self) -> Result<Self::Connection, BackendError>;

    /// Keepalive tuning, run once per physical connection before its first use
    async fn tune(&self, _conn: &mut Self::Connection) -> Result<(), BackendError> {
        Ok(())
    }

    /// Trivial round trip proving the connection still works
    async fn health_check(&self, conn: &mut Self::Connection) -> Result<(), BackendError>;

    /// Close a connection that will not be used again
    async fn disconnect(&self, conn: Self::Connection) {
        drop(conn);
    }
}
