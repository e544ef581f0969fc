use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use minirpc_common::protocol::error::{MinirpcError, Result};
use minirpc_common::transport::{read_frame, write_frame, TcpTransport};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Connection pool configuration.
///
/// # Default Configuration
///
/// - `initial_cap`: 1
/// - `max_cap`: 30
/// - `max_idle`: 10
/// - `idle_timeout`: 60 seconds
/// - `connect_timeout`: 3 seconds
/// - `acquire_timeout`: 30 seconds
///
/// # Example
///
/// ```rust
/// use minirpc_client::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::default()
///     .with_max_cap(4)
///     .with_max_idle(2)
///     .with_idle_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections dialled when the pool is created
    pub initial_cap: usize,
    /// Maximum number of live connections
    pub max_cap: usize,
    /// Maximum number of idle connections kept for reuse
    pub max_idle: usize,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Duration,
    /// Timeout for dialling one connection
    pub connect_timeout: Duration,
    /// Maximum time to wait for a free slot
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_cap: 1,
            max_cap: 30,
            max_idle: 10,
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(3),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    pub fn with_initial_cap(mut self, initial_cap: usize) -> Self {
        self.initial_cap = initial_cap;
        self
    }

    pub fn with_max_cap(mut self, max_cap: usize) -> Self {
        self.max_cap = max_cap;
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Checks the capacities against each other.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `max_cap` is zero, or if `initial_cap` or
    /// `max_idle` exceed `max_cap`.
    pub fn validate(&self) -> Result<()> {
        if self.max_cap == 0 {
            return Err(MinirpcError::InvalidConfig("max_cap must be greater than zero".into()));
        }
        if self.initial_cap > self.max_cap {
            return Err(MinirpcError::InvalidConfig(format!(
                "initial_cap ({}) exceeds max_cap ({})",
                self.initial_cap, self.max_cap
            )));
        }
        if self.max_idle > self.max_cap {
            return Err(MinirpcError::InvalidConfig(format!(
                "max_idle ({}) exceeds max_cap ({})",
                self.max_idle, self.max_cap
            )));
        }
        Ok(())
    }
}

struct IdleConn {
    stream: TcpStream,
    idle_since: Instant,
}

struct PoolShared {
    addr: String,
    config: PoolConfig,
    transport: TcpTransport,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConn>>,
}

impl PoolShared {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConn>> {
        // The queue holds no invariant a panicking holder could break.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes the most recently returned idle connection, closing stale ones.
    fn take_idle(&self) -> Option<TcpStream> {
        let mut idle = self.idle();
        let conn = idle.pop_back()?;
        if conn.idle_since.elapsed() <= self.config.idle_timeout {
            return Some(conn.stream);
        }

        // The queue is ordered by return time, so everything older is stale too.
        let closed = idle.len() + 1;
        idle.clear();
        tracing::debug!(addr = %self.addr, closed, "Closed idle connections past idle timeout");
        None
    }

    fn put_idle(&self, stream: TcpStream) {
        let mut idle = self.idle();
        if idle.len() < self.config.max_idle {
            idle.push_back(IdleConn {
                stream,
                idle_since: Instant::now(),
            });
        } else {
            tracing::trace!(addr = %self.addr, "Idle set full, closing connection");
        }
    }
}

/// Connection pool for one server address.
///
/// The pool keeps at most `max_cap` live connections. Each checkout holds one
/// semaphore permit; an idle connection is reused before a new one is
/// dialled, so idle plus checked-out connections never exceed the cap.
///
/// Cloning the pool is cheap and clones share the same connections.
///
/// # Example
///
/// ```rust,no_run
/// use minirpc_client::{ConnectionPool, PoolConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ConnectionPool::connect("127.0.0.1:8081", PoolConfig::default()).await?;
///
/// let mut conn = pool.acquire().await?;
/// // Use the connection...
///
/// // Dropping the guard returns it to the pool.
/// drop(conn);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Creates a pool and dials `initial_cap` connections up front.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an inconsistent config, or `Connection` if
    /// one of the initial connections cannot be established.
    pub async fn connect(addr: &str, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let transport = TcpTransport::new(config.connect_timeout);
        let mut initial = VecDeque::with_capacity(config.initial_cap);
        for _ in 0..config.initial_cap {
            let stream = transport.connect(addr).await?;
            initial.push_back(IdleConn {
                stream,
                idle_since: Instant::now(),
            });
        }

        tracing::info!(addr, initial = initial.len(), max_cap = config.max_cap, "Connection pool ready");

        Ok(Self {
            shared: Arc::new(PoolShared {
                addr: addr.to_string(),
                permits: Arc::new(Semaphore::new(config.max_cap)),
                idle: Mutex::new(initial),
                transport,
                config,
            }),
        })
    }

    /// Checks out a connection.
    ///
    /// Waits for a free slot, then reuses the most recent idle connection or
    /// dials a new one.
    ///
    /// # Errors
    ///
    /// - `PoolTimeout` if no slot frees up within `acquire_timeout`
    /// - `Connection` if a new connection cannot be established
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let timeout = self.shared.config.acquire_timeout;
        let permit = tokio::time::timeout(timeout, self.shared.permits.clone().acquire_owned())
            .await
            .map_err(|_| MinirpcError::PoolTimeout(timeout.as_millis() as u64))?
            .map_err(|_| MinirpcError::Connection("connection pool closed".into()))?;

        let stream = match self.shared.take_idle() {
            Some(stream) => stream,
            None => self.shared.transport.connect(&self.shared.addr).await?,
        };

        Ok(PooledConnection {
            stream: Some(stream),
            broken: false,
            pool: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Number of idle connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared.idle().len()
    }

    /// Number of connections currently checked out.
    pub fn in_use_count(&self) -> usize {
        self.shared.config.max_cap - self.shared.permits.available_permits()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addr", &self.shared.addr)
            .field("idle", &self.idle_count())
            .field("in_use", &self.in_use_count())
            .finish()
    }
}

/// A checked-out connection.
///
/// Dropping the guard releases it: a healthy connection goes back to the idle
/// set (or is closed when the idle set is full), a broken one is closed.
/// Either way its slot is freed.
pub struct PooledConnection {
    stream: Option<TcpStream>,
    broken: bool,
    pool: Arc<PoolShared>,
    // Dropped after `Drop::drop` has put the stream back.
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Writes one frame. A connection-fatal failure marks the connection broken.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(MinirpcError::ConnectionClosed)?;
        let result = write_frame(stream, frame).await;
        self.note(result)
    }

    /// Reads one frame. A connection-fatal failure marks the connection broken.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(MinirpcError::ConnectionClosed)?;
        let result = read_frame(stream).await;
        self.note(result)
    }

    fn note<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection_fatal() {
                self.mark_broken();
            }
        }
        result
    }

    /// Marks the connection so it is closed instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Returns the connection to the pool now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if self.broken {
                tracing::debug!(addr = %self.pool.addr, "Closing broken connection");
            } else {
                self.pool.put_idle(stream);
            }
        }
    }
}
