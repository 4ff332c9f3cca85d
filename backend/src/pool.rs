//! Bounded connection pool
//!
//! deadpool owns the slots, the wait queue and the idle list. [`Checked`] plugs a
//! [`ManageConnection`] into it: a new connection is tuned and health checked
//! before its first use, and an idle one is expired or health checked again when
//! it is checked out. Acquisition wraps `Pool::get` in the fixed retry loop: on
//! failure wait the backoff and try again, at most three times, unless the pool
//! is shutting down.

use crate::connection::ConnectionHandle;
use crate::errors::BackendError;
use crate::manager::ManageConnection;
use crate::state::{LifecycleState, StateCell};
use config::{BackendConfig, MAX_ACQUIRE_ATTEMPTS};
use deadpool::managed::{self, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult};
use deadpool::Runtime;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Pool bounds, limits and retry settings
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    pub min_connections: u32,
    pub max_connections: u32,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    /// Bound on waiting for a slot, on creating a connection and on the health check
    pub connection_timeout: Duration,
    /// Fixed pause between failed attempts
    pub retry_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 5,
            idle_timeout: Some(Duration::from_secs(400)),
            max_lifetime: Some(Duration::from_secs(20 * 60)),
            connection_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(5),
            max_attempts: MAX_ACQUIRE_ATTEMPTS,
        }
    }
}

impl PoolOptions {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            min_connections: config.pool.min_connections,
            max_connections: config.pool.max_connections.max(1),
            idle_timeout: config.pool.idle_timeout(),
            max_lifetime: config.pool.max_lifetime(),
            connection_timeout: config.connection_timeout(),
            retry_backoff: config.retry_backoff(),
            max_attempts: MAX_ACQUIRE_ATTEMPTS,
        }
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub state: LifecycleState,
    pub max_connections: u32,
    pub idle: usize,
    pub in_use: usize,
    /// Callers queued for a free slot
    pub waiting: usize,
    pub created: u64,
    pub broken: u64,
    pub acquired: u64,
    pub released: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    created: AtomicU64,
    broken: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PoolStats {
    fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, broken: bool) {
        Self::count(&self.released);
        if broken {
            Self::count(&self.broken);
        }
    }
}

/// A pooled connection and the time it last went back to the pool
pub(crate) struct Tracked<C> {
    pub(crate) conn: C,
    pub(crate) returned_at: Instant,
}

/// deadpool manager that prepares and re-checks connections from a
/// [`ManageConnection`]
pub(crate) struct Checked<M> {
    manager: M,
    idle_timeout: Option<Duration>,
    max_lifetime: Option<Duration>,
    stats: Arc<PoolStats>,
}

impl<M: ManageConnection> Checked<M> {
    async fn prepare(&self, conn: &mut M::Connection) -> Result<(), BackendError> {
        self.manager.tune(conn).await?;
        self.manager.health_check(conn).await
    }

    fn expired(&self, tracked: &Tracked<M::Connection>, metrics: &Metrics) -> Option<Duration> {
        if let Some(lifetime) = self.max_lifetime.filter(|limit| metrics.age() >= *limit) {
            return Some(lifetime);
        }
        self.idle_timeout
            .filter(|limit| tracked.returned_at.elapsed() >= *limit)
    }
}

impl<M: ManageConnection> managed::Manager for Checked<M> {
    type Type = Tracked<M::Connection>;
    type Error = BackendError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let mut conn = self.manager.connect().await?;
        PoolStats::count(&self.stats.created);

        if let Err(e) = self.prepare(&mut conn).await {
            PoolStats::count(&self.stats.broken);
            self.manager.disconnect(conn).await;
            return Err(e);
        }

        Ok(Tracked {
            conn,
            returned_at: Instant::now(),
        })
    }

    async fn recycle(
        &self,
        tracked: &mut Self::Type,
        metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        if let Some(limit) = self.expired(tracked, metrics) {
            trace!(limit = ?limit, "Closing expired connection");
            return Err(RecycleError::Backend(BackendError::Timeout(limit)));
        }

        self.manager
            .health_check(&mut tracked.conn)
            .await
            .map_err(|e| {
                PoolStats::count(&self.stats.broken);
                RecycleError::Backend(e)
            })
    }
}

/// The acquisition retry loop.
///
/// Runs `attempt` up to `max_attempts` times while `shutdown` is not cancelled,
/// sleeping `backoff` between failures. The shutdown flag is checked before each
/// attempt and interrupts the backoff sleep.
pub(crate) async fn acquire_with_retries<T, F, Fut>(
    name: &str,
    max_attempts: u32,
    backoff: Duration,
    shutdown: &CancellationToken,
    mut attempt: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut last_error = None;

    for attempt_no in 1..=max_attempts {
        if shutdown.is_cancelled() {
            return Err(BackendError::ShuttingDown(name.to_string()));
        }

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(BackendError::ShuttingDown(instance)) => {
                return Err(BackendError::ShuttingDown(instance))
            }
            Err(e) => {
                error!(
                    backend = %name,
                    attempt = attempt_no,
                    max_attempts,
                    error = %e,
                    "Failed to acquire a healthy connection"
                );
                last_error = Some(e);
            }
        }

        if attempt_no < max_attempts {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    return Err(BackendError::ShuttingDown(name.to_string()));
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    Err(BackendError::Exhausted {
        instance: name.to_string(),
        attempts: max_attempts,
        last: Box::new(
            last_error.unwrap_or_else(|| BackendError::ShuttingDown(name.to_string())),
        ),
    })
}

struct PoolShared<M: ManageConnection> {
    name: String,
    options: PoolOptions,
    pool: Pool<Checked<M>>,
    state: StateCell,
    closing: AtomicBool,
    shutdown: CancellationToken,
    stats: Arc<PoolStats>,
}

/// Bounded pool of connections produced by a [`ManageConnection`]
pub struct ConnectionPool<M: ManageConnection> {
    shared: Arc<PoolShared<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ManageConnection> std::fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.shared.name)
            .field("target", &self.manager().describe())
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Create a closed pool; nothing connects until [`open_pool`](Self::open_pool)
    /// or the first acquire
    pub fn new(name: &str, manager: M, options: PoolOptions) -> Result<Self, BackendError> {
        let stats = Arc::new(PoolStats::default());
        let checked = Checked {
            manager,
            idle_timeout: options.idle_timeout,
            max_lifetime: options.max_lifetime,
            stats: Arc::clone(&stats),
        };

        let timeout = Some(options.connection_timeout);
        let pool = Pool::builder(checked)
            .max_size(options.max_connections.max(1) as usize)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| BackendError::Pool(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(PoolShared {
                name: name.to_string(),
                options,
                pool,
                state: StateCell::new(),
                closing: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                stats,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn manager(&self) -> &M {
        &self.shared.pool.manager().manager
    }

    pub fn options(&self) -> &PoolOptions {
        &self.shared.options
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state.get()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Open the pool and warm up `min_connections`. Connections that fail to come
    /// up during warm-up are left to be created on demand.
    pub async fn open_pool(&self) -> Result<(), BackendError> {
        self.open_with(self.shared.options.min_connections, false)
            .await
    }

    /// Open and warm up `warm` connections. With `strict`, a connection that
    /// cannot be made fails the open and leaves the pool closed.
    pub(crate) async fn open_with(&self, warm: u32, strict: bool) -> Result<(), BackendError> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(BackendError::ShuttingDown(shared.name.clone()));
        }
        if !shared
            .state
            .transition(LifecycleState::Closed, LifecycleState::Opening)
        {
            return Ok(());
        }

        let warm = warm.min(shared.options.max_connections);
        let mut warmed = Vec::with_capacity(warm as usize);
        for _ in 0..warm {
            match self.checkout().await {
                Ok(object) => warmed.push(object),
                Err(e) if strict => {
                    shared.state.set(LifecycleState::Closed);
                    return Err(e);
                }
                Err(e) => {
                    warn!(pool = %shared.name, error = %e, "Pool warm-up connection failed");
                    break;
                }
            }
        }
        // Back to the idle list
        drop(warmed);

        shared.state.set(LifecycleState::Open);
        debug!(
            pool = %shared.name,
            target = %self.manager().describe(),
            idle = shared.pool.status().available,
            max = shared.options.max_connections,
            "Connection pool opened"
        );
        Ok(())
    }

    /// Acquire a healthy connection, opening the pool first if needed
    pub async fn acquire(&self) -> Result<ConnectionHandle<M>, BackendError> {
        if self.state() == LifecycleState::Closed {
            self.open_pool().await?;
        }

        let options = &self.shared.options;
        let object = acquire_with_retries(
            &self.shared.name,
            options.max_attempts,
            options.retry_backoff,
            &self.shared.shutdown,
            || self.checkout(),
        )
        .await?;

        PoolStats::count(&self.shared.stats.acquired);
        Ok(ConnectionHandle::new(object, Arc::clone(&self.shared.stats)))
    }

    async fn checkout(&self) -> Result<Object<Checked<M>>, BackendError> {
        let shared = &self.shared;
        shared.pool.get().await.map_err(|e| match e {
            PoolError::Backend(e) => e,
            PoolError::Timeout(_) => BackendError::Timeout(shared.options.connection_timeout),
            PoolError::Closed => BackendError::ShuttingDown(shared.name.clone()),
            other => BackendError::Pool(other.to_string()),
        })
    }

    /// Return a handle to the pool; dropping the handle does the same
    pub fn release(&self, handle: ConnectionHandle<M>) {
        drop(handle);
        trace!(pool = %self.shared.name, status = ?self.status(), "Connection released");
    }

    /// Stop handing out connections and close the idle ones. Idempotent; handles
    /// still checked out are dropped when they come back.
    pub async fn close_pool(&self) {
        let shared = &self.shared;
        if shared.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        shared.shutdown.cancel();
        shared.state.set(LifecycleState::Closing);

        let drained = shared.pool.retain(|_, _| false).removed;
        shared.pool.close();
        let count = drained.len();
        for tracked in drained {
            self.manager().disconnect(tracked.conn).await;
        }

        shared.state.set(LifecycleState::Closed);
        debug!(pool = %shared.name, closed = count, "Connection pool closed");
    }

    pub fn status(&self) -> PoolStatus {
        let shared = &self.shared;
        let status = shared.pool.status();
        let stats = &shared.stats;

        PoolStatus {
            state: shared.state.get(),
            max_connections: shared.options.max_connections.max(1),
            idle: status.available,
            in_use: status.size.saturating_sub(status.available),
            waiting: status.waiting,
            created: stats.created.load(Ordering::Relaxed),
            broken: stats.broken.load(Ordering::Relaxed),
            acquired: stats.acquired.load(Ordering::Relaxed),
            released: stats.released.load(Ordering::Relaxed),
        }
    }
}
