//! Observer hooks for pool lifecycle events.

use std::sync::{Arc, Once, PoisonError, RwLock};

use crate::{
    Result,
    session::{Session, SessionInfo},
};

/// Receives pool lifecycle events.
///
/// Implementations override the events they care about; a default body is
/// equivalent to not being registered for that event. Callbacks run
/// synchronously on the thread driving the pool operation, in registration
/// order, with the session and its record's info bag borrowed for the call.
pub trait PoolListener<S: Session>: Send + Sync + 'static {
    /// Fired exactly once per pool, when the first record opens its session,
    /// strictly before any `connect` event.
    fn first_connect(&self, session: &mut S, info: &mut SessionInfo) {
        let _ = (session, info);
    }

    /// Fired every time a record opens a session, including reopens after
    /// invalidation or recycling.
    fn connect(&self, session: &mut S, info: &mut SessionInfo) {
        let _ = (session, info);
    }

    /// Fired when a session is first checked out of the pool.
    ///
    /// Returning [`Error::Disconnection`](crate::Error::Disconnection) makes
    /// the pool invalidate the record, open a fresh session, and retry the
    /// checkout once.
    fn checkout(&self, session: &mut S, info: &mut SessionInfo) -> Result<()> {
        let _ = (session, info);
        Ok(())
    }

    /// Fired when a session is returned to the pool. The session is absent
    /// if the record was invalidated while checked out.
    fn checkin(&self, session: Option<&mut S>, info: &mut SessionInfo) {
        let _ = (session, info);
    }
}

/// Ordered listener registry plus the one-shot first-connect latch.
pub(crate) struct ListenerHub<S: Session> {
    listeners: RwLock<Vec<Arc<dyn PoolListener<S>>>>,
    first_connect: Once,
}

impl<S: Session> ListenerHub<S> {
    pub(crate) fn new(listeners: Vec<Arc<dyn PoolListener<S>>>) -> Self {
        Self {
            listeners: RwLock::new(listeners),
            first_connect: Once::new(),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn PoolListener<S>>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn PoolListener<S>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Dispatch for a session that just opened. The first successful open
    /// anywhere in the pool additionally fires `first_connect`, before any
    /// `connect` observer runs; the `Once` latch orders concurrent openers.
    pub(crate) fn session_opened(&self, session: &mut S, info: &mut SessionInfo) {
        self.first_connect.call_once(|| {
            for listener in self.snapshot() {
                listener.first_connect(session, info);
            }
        });
        for listener in self.snapshot() {
            listener.connect(session, info);
        }
    }

    /// Dispatch checkout observers; the first error stops the walk.
    pub(crate) fn checkout(&self, session: &mut S, info: &mut SessionInfo) -> Result<()> {
        for listener in self.snapshot() {
            listener.checkout(session, info)?;
        }
        Ok(())
    }

    pub(crate) fn checkin(&self, mut session: Option<&mut S>, info: &mut SessionInfo) {
        for listener in self.snapshot() {
            listener.checkin(session.as_mut().map(|s| &mut **s), info);
        }
    }
}
