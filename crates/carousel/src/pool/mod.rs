//! Provides the session pool.
//!
//! Opening a session against a stateful wire-protocol backend means a TCP
//! connect, a protocol handshake, authentication, and keyspace selection;
//! doing that per request gets expensive fast. A pool keeps opened sessions
//! around, re-using them across checkouts, bounding how many exist at once,
//! and reopening the ones that break or age out.
//!
//! Build a pool with [`Carousel::build`](crate::Carousel::build), draw a
//! session with [`Pool::connect`], and issue requests through
//! [`PooledSession::with_session`]; when the handle is dropped the session
//! returns to the pool for reuse.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::{Result, carousel::Carousel, listener::PoolListener, session::Connect};

mod handle;
mod inner;
mod record;
mod store;

pub use handle::PooledSession;

use handle::HandleInner;
use inner::PoolInner;

thread_local! {
    /// The calling thread's live handle, per pool id, when thread-local
    /// checkout caching is enabled. Weak references only; the strong ones
    /// are the `PooledSession` values the caller holds.
    static THREAD_HANDLES: RefCell<HashMap<u64, Weak<dyn Any + Send + Sync>>> =
        RefCell::new(HashMap::new());
}

pub(crate) fn clear_thread_handle(pool_id: u64) {
    THREAD_HANDLES.with(|handles| {
        handles.borrow_mut().remove(&pool_id);
    });
}

/// A pool of backend sessions.
///
/// `Pool` is `Send`, `Sync` and `Clone`; it is intended to be created once
/// and shared across every thread that talks to the backend. Cloning is
/// cheap, just a reference count on the shared state.
///
/// [`connect`][Pool::connect] hands out [`PooledSession`] handles. With the
/// default thread-local mode, nested `connect` calls on one thread share a
/// single checked-out session and only the outermost close really checks it
/// in; [`unique_connection`][Pool::unique_connection] always draws its own.
///
/// How many sessions exist at once, and what happens when they run out, is
/// the pooling store's business, selected with
/// [`Carousel::kind`](crate::Carousel::kind).
pub struct Pool<C: Connect>(pub(crate) Arc<PoolInner<C>>);

/// Returns a new [Pool] tied to the same shared state.
impl<C: Connect> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C: Connect> Pool<C> {
    pub(crate) fn new(options: Carousel, connector: C) -> Self {
        Pool(PoolInner::new(options, Arc::new(connector), Vec::new()))
    }

    /// Check a session out of the pool.
    ///
    /// With `use_threadlocal` (the default), repeated calls from one thread
    /// nest on the same checked-out handle; the depth counter tracks the
    /// nesting and the final close performs the real checkin.
    pub fn connect(&self) -> Result<PooledSession<C>> {
        if !self.0.options.use_threadlocal {
            return HandleInner::new(&self.0)?.checkout();
        }

        if let Some(existing) = self.cached_handle() {
            return existing.checkout();
        }

        let agent = HandleInner::new(&self.0)?;
        let agent_any: Arc<dyn Any + Send + Sync> = agent.clone();
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&agent_any);
        THREAD_HANDLES.with(|handles| {
            handles.borrow_mut().insert(self.0.id, weak);
        });
        agent.checkout()
    }

    /// Check out a session bypassing the thread-local handle cache.
    pub fn unique_connection(&self) -> Result<PooledSession<C>> {
        HandleInner::new(&self.0)?.checkout()
    }

    fn cached_handle(&self) -> Option<Arc<HandleInner<C>>> {
        THREAD_HANDLES.with(|handles| {
            let handles = handles.borrow();
            handles
                .get(&self.0.id)?
                .upgrade()?
                .downcast::<HandleInner<C>>()
                .ok()
        })
    }

    /// Close every idle session and reset the store's accounting.
    ///
    /// Checked-out sessions are unaffected and close normally when their
    /// handles go. Prefer building a replacement with
    /// [`recreate`][Pool::recreate] over reusing a disposed pool.
    pub fn dispose(&self) {
        self.0.store.dispose(&self.0);
    }

    /// Drop the calling thread's pooled state. Only meaningful for the
    /// singleton-thread store; a no-op elsewhere.
    pub fn dispose_local(&self) {
        self.0.store.dispose_local(&self.0);
    }

    /// A new pool with this pool's configuration, connector and current
    /// listeners, but fresh store state and a fresh first-connect latch.
    pub fn recreate(&self) -> Pool<C> {
        self.0.logger.notice(format_args!("pool recreating"));
        Pool(PoolInner::new(
            self.0.options.clone(),
            Arc::clone(&self.0.connector),
            self.0.listeners.snapshot(),
        ))
    }

    /// One-line snapshot of the store state.
    pub fn status(&self) -> String {
        self.0.store.status(&self.0)
    }

    /// Register a lifecycle observer. Observers fire in registration order.
    pub fn add_listener(&self, listener: Arc<dyn PoolListener<C::Session>>) {
        self.0.listeners.add(listener);
    }

    /// The number of live records the store accounts for, idle and checked
    /// out together.
    pub fn size(&self) -> u32 {
        self.0.store.size()
    }

    /// The number of records currently resting idle in the store.
    pub fn num_idle(&self) -> usize {
        self.0.store.num_idle()
    }

    /// The keyspace this pool opens its sessions against.
    pub fn keyspace(&self) -> &str {
        &self.0.options.keyspace
    }
}

impl<C: Connect> fmt::Debug for Pool<C> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pool")
            .field("size", &self.size())
            .field("num_idle", &self.num_idle())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    struct NopSession;

    impl Session for NopSession {
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct NopConnect;

    impl Connect for NopConnect {
        type Session = NopSession;

        fn open(
            &self,
            _keyspace: &str,
            _server: &str,
            _credentials: Option<&crate::Credentials>,
        ) -> Result<NopSession> {
            Ok(NopSession)
        }
    }

    #[test]
    #[allow(dead_code)]
    fn assert_pool_traits() {
        fn assert_send_sync<T: Send + Sync>() {}
        fn assert_clone<T: Clone>() {}

        fn assert_pool() {
            assert_send_sync::<Pool<NopConnect>>();
            assert_clone::<Pool<NopConnect>>();
            assert_send_sync::<PooledSession<NopConnect>>();
        }
    }
}
