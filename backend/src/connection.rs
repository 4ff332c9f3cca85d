//! Connection handles and single-connection backends

use crate::errors::BackendError;
use crate::manager::ManageConnection;
use crate::pool::{Checked, ConnectionPool, PoolOptions, PoolStats, PoolStatus};
use crate::state::LifecycleState;
use async_trait::async_trait;
use deadpool::managed::Object;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Exclusive use of one connection, returned to its pool on drop
pub struct ConnectionHandle<M: ManageConnection> {
    object: Option<Object<Checked<M>>>,
    stats: Arc<PoolStats>,
    acquired_at: Instant,
    broken: bool,
}

impl<M: ManageConnection> ConnectionHandle<M> {
    pub(crate) fn new(object: Object<Checked<M>>, stats: Arc<PoolStats>) -> Self {
        Self {
            object: Some(object),
            stats,
            acquired_at: Instant::now(),
            broken: false,
        }
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Discard the connection instead of reusing it when the handle is dropped
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<M: ManageConnection> std::fmt::Debug for ConnectionHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("broken", &self.broken)
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl<M: ManageConnection> Deref for ConnectionHandle<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self
            .object
            .as_ref()
            .expect("BUG: inner connection already taken")
            .conn
    }
}

impl<M: ManageConnection> DerefMut for ConnectionHandle<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .object
            .as_mut()
            .expect("BUG: inner connection already taken")
            .conn
    }
}

impl<M: ManageConnection> Drop for ConnectionHandle<M> {
    fn drop(&mut self) {
        let Some(mut object) = self.object.take() else {
            return;
        };

        self.stats.record_release(self.broken);
        if self.broken {
            // Frees the slot; the connection closes as it drops
            drop(Object::take(object));
            debug!("Discarding broken connection");
        } else {
            object.returned_at = Instant::now();
            drop(object);
        }
        trace!(held_ms = self.acquired_at.elapsed().as_millis() as u64, "Connection handle dropped");
    }
}

/// Anything that hands out connections: a pool or a single dedicated connection
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Manager: ManageConnection;

    fn name(&self) -> &str;

    fn manager(&self) -> &Self::Manager;

    fn state(&self) -> LifecycleState;

    async fn acquire(&self) -> Result<ConnectionHandle<Self::Manager>, BackendError>;

    /// Give a handle back; equivalent to dropping it
    fn release(&self, handle: ConnectionHandle<Self::Manager>) {
        drop(handle);
    }
}

#[async_trait]
impl<M: ManageConnection> ConnectionSource for ConnectionPool<M> {
    type Manager = M;

    fn name(&self) -> &str {
        ConnectionPool::name(self)
    }

    fn manager(&self) -> &M {
        ConnectionPool::manager(self)
    }

    fn state(&self) -> LifecycleState {
        ConnectionPool::state(self)
    }

    async fn acquire(&self) -> Result<ConnectionHandle<M>, BackendError> {
        ConnectionPool::acquire(self).await
    }

    fn release(&self, handle: ConnectionHandle<M>) {
        ConnectionPool::release(self, handle)
    }
}

/// Exactly one connection to a backend, used by the blocking execution model.
///
/// A pool of size one: callers take turns on the connection, and a second
/// acquire waits (bounded by the connection timeout) until the first handle is
/// dropped.
pub struct BackendConnection<M: ManageConnection> {
    pool: ConnectionPool<M>,
}

impl<M: ManageConnection> BackendConnection<M> {
    /// The pool bounds in `options` are replaced by a single slot
    pub fn new(name: &str, manager: M, options: PoolOptions) -> Result<Self, BackendError> {
        let options = options.with_min_connections(0).with_max_connections(1);
        Ok(Self {
            pool: ConnectionPool::new(name, manager, options)?,
        })
    }

    pub fn name(&self) -> &str {
        self.pool.name()
    }

    pub fn manager(&self) -> &M {
        self.pool.manager()
    }

    pub fn state(&self) -> LifecycleState {
        self.pool.state()
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Connect if not connected yet. Calling it on an open connection is a no-op.
    pub async fn open(&self) -> Result<(), BackendError> {
        self.pool.open_with(1, true).await?;
        debug!(backend = %self.name(), "Connection opened");
        Ok(())
    }

    pub async fn acquire(&self) -> Result<ConnectionHandle<M>, BackendError> {
        self.pool.acquire().await
    }

    pub fn release(&self, handle: ConnectionHandle<M>) {
        self.pool.release(handle);
    }

    /// Close the connection. Idempotent, and safe when nothing was ever opened.
    pub async fn close(&self) {
        self.pool.close_pool().await;
    }
}

#[async_trait]
impl<M: ManageConnection> ConnectionSource for BackendConnection<M> {
    type Manager = M;

    fn name(&self) -> &str {
        BackendConnection::name(self)
    }

    fn manager(&self) -> &M {
        BackendConnection::manager(self)
    }

    fn state(&self) -> LifecycleState {
        BackendConnection::state(self)
    }

    async fn acquire(&self) -> Result<ConnectionHandle<M>, BackendError> {
        BackendConnection::acquire(self).await
    }
}
