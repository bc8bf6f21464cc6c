use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    pool::Pool,
    session::{Connect, Credentials},
};

pub(crate) static POOL_SEQ: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_pool_id() -> u64 {
    POOL_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Which store a pool keeps its idle session records in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolKind {
    /// A bounded FIFO of idle sessions with a configurable overflow
    /// allowance. The default, and the right choice for almost everything.
    #[default]
    Queue,
    /// One session per thread, never shared across threads. Forces
    /// thread-local handle caching.
    SingletonThread,
    /// No pooling at all: every acquisition opens a session and every
    /// release closes it.
    Null,
    /// A single session shared by every acquisition. Invalidation is not
    /// supported on this variant.
    Static,
    /// At most one session checked out at any time; a second checkout fails
    /// with [`Error::Assertion`](crate::Error::Assertion). Useful for
    /// debugging session leaks.
    Assertion,
}

/// Create a carousel session pool.
#[derive(Clone, Debug)]
pub struct Carousel {
    pub(crate) keyspace: String,
    pub(crate) servers: Vec<String>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) kind: PoolKind,
    pub(crate) pool_size: u32,
    pub(crate) max_overflow: i32,
    pub(crate) timeout: Duration,
    pub(crate) recycle: Option<Duration>,
    pub(crate) use_threadlocal: bool,
    pub(crate) reset_on_return: bool,
    pub(crate) logging_name: Option<String>,
    pub(crate) echo: bool,
}

impl Default for Carousel {
    fn default() -> Self {
        Self::new()
    }
}

impl Carousel {
    /// Construct `Self` with default options.
    ///
    /// See the source of this method for the current defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyspace: String::new(),
            servers: vec!["localhost:9160".into()],
            credentials: None,
            kind: PoolKind::Queue,
            pool_size: 5,
            max_overflow: 10,
            timeout: Duration::from_secs(30),
            recycle: None,
            use_threadlocal: true,
            reset_on_return: true,
            logging_name: None,
            echo: false,
        }
    }

    /// The keyspace every pooled session is opened against.
    #[must_use]
    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = keyspace.into();
        self
    }

    /// The ordered `host:port` server list. Session creation round-robins
    /// its starting server across this list and fails over along it.
    #[must_use]
    pub fn servers<I, T>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Authentication material passed to the connector, opaque to the pool.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Select the pooling store. Defaults to [`PoolKind::Queue`].
    #[must_use]
    pub fn kind(mut self, kind: PoolKind) -> Self {
        self.kind = kind;
        self
    }

    /// The number of sessions kept persistently in the pool.
    ///
    /// For the queue store this is the idle capacity; sessions beyond it are
    /// overflow and are closed rather than stored when returned. Zero
    /// disables idle storage entirely, making every release discard its
    /// session. For the singleton-thread store this caps the number of
    /// per-thread sessions retained at once.
    ///
    /// Defaults to 5.
    #[must_use]
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// How many sessions may exist beyond `pool_size` at peak (queue store
    /// only). When overflow sessions are returned they are closed and
    /// discarded. Set to `-1` for no overflow limit. Defaults to 10.
    #[must_use]
    pub fn max_overflow(mut self, max_overflow: i32) -> Self {
        self.max_overflow = max_overflow;
        self
    }

    /// How long an acquisition may wait for a session to be returned before
    /// failing with [`Error::PoolTimedOut`](crate::Error::PoolTimedOut)
    /// (queue store only). Defaults to 30 seconds.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Close and reopen any session older than this on its next
    /// acquisition, clearing the record's info bag. A zero duration recycles
    /// on every acquisition. Disabled by default.
    #[must_use]
    pub fn recycle(mut self, recycle: impl Into<Option<Duration>>) -> Self {
        self.recycle = recycle.into();
        self
    }

    /// When enabled (the default), repeated [`Pool::connect`] calls from the
    /// same thread nest on one checked-out handle instead of drawing further
    /// sessions; the final close performs the real checkin.
    /// [`Pool::unique_connection`] bypasses the cache.
    #[must_use]
    pub fn use_threadlocal(mut self, on: bool) -> Self {
        self.use_threadlocal = on;
        self
    }

    /// Call `rollback()` on sessions before they are returned to the pool,
    /// discarding any half-finished server-side state. Enabled by default;
    /// disable at your own peril.
    #[must_use]
    pub fn reset_on_return(mut self, on: bool) -> Self {
        self.reset_on_return = on;
        self
    }

    /// Identifier attached to every event this pool emits. Defaults to a
    /// generated `pool-{n}` name.
    #[must_use]
    pub fn logging_name(mut self, name: impl Into<String>) -> Self {
        self.logging_name = Some(name.into());
        self
    }

    /// Emit routine checkout and checkin events at INFO instead of DEBUG.
    #[must_use]
    pub fn echo(mut self, on: bool) -> Self {
        self.echo = on;
        self
    }

    /// Build a pool around `connector`.
    ///
    /// Construction is lazy: no session is opened until the first
    /// acquisition needs one.
    pub fn build<C: Connect>(self, connector: C) -> Pool<C> {
        Pool::new(self, connector)
    }
}
