use std::fmt::{self, Debug, Formatter};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    Error, Result,
    session::{Connect, Session, SessionInfo},
};

use super::inner::PoolInner;
use super::record::SessionRecord;

const EXPECT_MSG: &str = "BUG: inner handle already taken!";

/// A session checked out of a [`Pool`](crate::Pool).
///
/// Each value represents one unit of checkout depth: dropping it, or calling
/// [`close`](Self::close), checks that unit back in. When the last
/// outstanding unit goes, the handle runs the return protocol (best-effort
/// rollback, checkin observers, release to the store) and becomes terminal.
///
/// The backend session is reached through
/// [`with_session`](Self::with_session); every operation on a terminal
/// handle fails with [`Error::InvalidRequest`].
pub struct PooledSession<C: Connect> {
    inner: Option<Arc<HandleInner<C>>>,
}

pub(crate) struct HandleInner<C: Connect> {
    pool: Arc<PoolInner<C>>,
    /// Net checkout minus close count; never negative.
    depth: Mutex<u32>,
    record: Mutex<Option<Arc<SessionRecord<C>>>>,
    /// The session itself, once `detach` has severed it from its record.
    detached: Mutex<Option<C::Session>>,
    detached_info: Mutex<Option<SessionInfo>>,
    /// Set once the handle is terminal.
    closed: AtomicBool,
    /// Guards the return protocol so it runs exactly once.
    finalized: AtomicBool,
}

impl<C: Connect> HandleInner<C> {
    /// Draw a record from the store, make sure its session is open, and wire
    /// up the holder back-reference.
    pub(crate) fn new(pool: &Arc<PoolInner<C>>) -> Result<Arc<Self>> {
        let record = pool.store.acquire(pool)?;
        if let Err(e) = record.ensure_open(pool) {
            // hand the (empty) record straight back so store accounting
            // stays exact; the next acquirer will reopen it
            let _ = pool.store.release(pool, record);
            return Err(e);
        }
        let inner = Arc::new(Self {
            pool: Arc::clone(pool),
            depth: Mutex::new(0),
            record: Mutex::new(Some(Arc::clone(&record))),
            detached: Mutex::new(None),
            detached_info: Mutex::new(None),
            closed: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        });
        record.set_holder(Some(Arc::downgrade(&inner)));
        pool.logger
            .event(format_args!("session checked out from pool"));
        Ok(inner)
    }

    /// Raise the checkout depth by one, running checkout observers on the
    /// 0 to 1 transition only. Observers can force a reconnect by returning
    /// [`Error::Disconnection`]; two total attempts are made before the
    /// handle is closed and the checkout fails.
    pub(crate) fn checkout(self: &Arc<Self>) -> Result<PooledSession<C>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed());
        }

        {
            let mut depth = self.depth.lock()?;
            *depth += 1;
            if *depth != 1 || self.pool.listeners.is_empty() {
                return Ok(PooledSession {
                    inner: Some(Arc::clone(self)),
                });
            }
        }

        let mut attempts = 2;
        while attempts > 0 {
            let record = self.record()?;
            let outcome: Result<()> = (|| {
                let mut slot = record.slot.lock()?;
                let session = slot.as_mut().ok_or_else(Error::closed)?;
                let mut info = record.info.lock()?;
                self.pool.listeners.checkout(session, &mut info)
            })();

            match outcome {
                Ok(()) => {
                    return Ok(PooledSession {
                        inner: Some(Arc::clone(self)),
                    });
                }
                Err(err @ Error::Disconnection { .. }) => {
                    self.pool.logger.notice(format_args!("{err}"));
                    if self.pool.store.allows_invalidate() {
                        record.invalidate(Some(&err));
                    } else {
                        self.pool.logger.notice(format_args!(
                            "store does not support invalidation, keeping session"
                        ));
                    }
                    if let Err(e) = record.ensure_open(&self.pool) {
                        self.abort_checkout(false);
                        return Err(e);
                    }
                    attempts -= 1;
                }
                Err(other) => {
                    // a failing observer aborts the checkout; the record
                    // goes back to the store and the error surfaces
                    self.abort_checkout(false);
                    return Err(other);
                }
            }
        }

        self.pool
            .logger
            .notice(format_args!("reconnection attempts exhausted on checkout"));
        self.abort_checkout(true);
        Err(Error::closed())
    }

    /// Tear the handle down after a checkout that cannot complete.
    fn abort_checkout(&self, invalidate: bool) {
        *self.depth.lock().unwrap_or_else(PoisonError::into_inner) = 0;
        self.closed.store(true, Ordering::Release);
        if invalidate && self.pool.store.allows_invalidate() {
            if let Some(record) = self
                .record
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
            {
                record.invalidate(None);
            }
        }
        if let Err(e) = self.finalize() {
            self.pool
                .logger
                .notice(format_args!("error returning session after failed checkout: {e}"));
        }
    }

    /// Drop one unit of depth; the last unit marks the handle terminal and
    /// runs the return protocol.
    pub(crate) fn release_one(&self) -> Result<()> {
        {
            let mut depth = self.depth.lock()?;
            *depth = depth.saturating_sub(1);
            if *depth > 0 {
                return Ok(());
            }
        }
        self.closed.store(true, Ordering::Release);
        self.finalize()
    }

    /// Mark the backing record invalid and check the handle in immediately,
    /// regardless of nesting depth.
    pub(crate) fn invalidate(&self, cause: Option<&Error>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed());
        }
        if let Some(record) = self.record.lock()?.clone() {
            if !self.pool.store.allows_invalidate() {
                return Err(Error::InvalidRequest(
                    "this pool does not support invalidation".into(),
                ));
            }
            record.invalidate(cause);
        }
        *self.depth.lock()? = 0;
        self.closed.store(true, Ordering::Release);
        self.finalize()
    }

    /// Sever the handle from its pool. The record gives up its session and
    /// returns to the store (it reconnects on its next acquisition); the
    /// handle keeps the session, plus a shallow copy of the info bag, and
    /// its final close literally closes the session.
    pub(crate) fn detach(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed());
        }
        let record = {
            let mut slot = self.record.lock()?;
            match slot.take() {
                Some(record) => record,
                // already detached
                None => return Ok(()),
            }
        };
        if record.held_by(self) {
            record.set_holder(None);
        }
        *self.detached.lock()? = record.take_session();
        *self.detached_info.lock()? = Some(record.info_snapshot()?);
        self.pool
            .logger
            .event(format_args!("session detached from pool"));
        self.pool.store.release(&self.pool, record)
    }

    /// The return protocol. Runs at most once per handle.
    fn finalize(&self) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let record = self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if self.pool.options.reset_on_return {
            self.reset(record.as_deref());
        }

        let record = match record {
            Some(record) => record,
            None => {
                // detached handles close their session literally
                let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(mut session) = detached.take() {
                    self.pool
                        .logger
                        .event(format_args!("closing detached session"));
                    if let Err(e) = session.close() {
                        self.pool
                            .logger
                            .event(format_args!("session threw an error on close: {e}"));
                    }
                }
                return Ok(());
            }
        };

        if record.held_by(self) {
            record.set_holder(None);
        }
        self.pool
            .logger
            .event(format_args!("session being returned to pool"));
        {
            let mut slot = record.slot.lock().unwrap_or_else(PoisonError::into_inner);
            let mut info = record.info.lock().unwrap_or_else(PoisonError::into_inner);
            self.pool.listeners.checkin(slot.as_mut(), &mut info);
        }
        self.pool.return_record(record)
    }

    /// Best-effort rollback before the session is seen again. Errors are
    /// logged and invalidate the record.
    fn reset(&self, record: Option<&SessionRecord<C>>) {
        match record {
            Some(record) => {
                let failed = {
                    let mut slot = record.slot.lock().unwrap_or_else(PoisonError::into_inner);
                    match slot.as_mut() {
                        Some(session) => session.rollback().err(),
                        None => None,
                    }
                };
                if let Some(e) = failed {
                    self.pool
                        .logger
                        .notice(format_args!("rollback failed on checkin: {e}"));
                    if self.pool.store.allows_invalidate() {
                        record.invalidate(Some(&e));
                    }
                }
            }
            None => {
                let mut detached = self.detached.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(session) = detached.as_mut() {
                    if let Err(e) = session.rollback() {
                        self.pool
                            .logger
                            .notice(format_args!("rollback failed on close: {e}"));
                    }
                }
            }
        }
    }

    fn record(&self) -> Result<Arc<SessionRecord<C>>> {
        self.record.lock()?.clone().ok_or_else(Error::closed)
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut C::Session) -> R) -> Result<R> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed());
        }
        {
            let mut detached = self.detached.lock()?;
            if let Some(session) = detached.as_mut() {
                return Ok(f(session));
            }
        }
        let record = self.record()?;
        let mut slot = record.slot.lock()?;
        let session = slot.as_mut().ok_or_else(Error::closed)?;
        Ok(f(session))
    }

    pub(crate) fn with_info<R>(&self, f: impl FnOnce(&mut SessionInfo) -> R) -> Result<R> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed());
        }
        if let Some(record) = self.record.lock()?.clone() {
            let mut info = record.info.lock()?;
            return Ok(f(&mut info));
        }
        let mut detached_info = self.detached_info.lock()?;
        Ok(f(detached_info.get_or_insert_with(SessionInfo::new)))
    }
}

impl<C: Connect> PooledSession<C> {
    fn inner(&self) -> &Arc<HandleInner<C>> {
        self.inner.as_ref().expect(EXPECT_MSG)
    }

    /// Run `f` over the live backend session.
    ///
    /// This is the forwarding seam: whatever request operations your session
    /// type offers are reached here. The session stays locked for the
    /// duration of `f`, so keep callbacks short in threaded code.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut C::Session) -> R) -> Result<R> {
        self.inner().with_session(f)
    }

    /// Run `f` over the scratch info bag attached to the underlying record
    /// (or over the handle's own copy once detached). The bag is cleared
    /// whenever the record opens a fresh session.
    pub fn with_info<R>(&self, f: impl FnOnce(&mut SessionInfo) -> R) -> Result<R> {
        self.inner().with_info(f)
    }

    /// `false` once the handle is terminal (closed or invalidated).
    pub fn is_valid(&self) -> bool {
        self.inner().is_valid()
    }

    /// Check this unit back in. The last outstanding close runs the return
    /// protocol; errors from it (rollback observers, assertion stores)
    /// surface here, where dropping the handle would only log them.
    pub fn close(mut self) -> Result<()> {
        let inner = self.inner.take().expect(EXPECT_MSG);
        inner.release_one()
    }

    /// Mark the underlying session broken: it is closed immediately, the
    /// record reopens on its next acquisition, and this handle becomes
    /// terminal regardless of checkout nesting.
    pub fn invalidate(mut self, cause: Option<&Error>) -> Result<()> {
        let inner = self.inner.take().expect(EXPECT_MSG);
        inner.invalidate(cause)
    }

    /// Separate this handle from its pool.
    ///
    /// The handle keeps the session for direct use and its final close
    /// literally closes it; the record returns to the store without a
    /// session and reconnects on its next acquisition. Note that a pool's
    /// sizing limits no longer see a detached session.
    pub fn detach(&self) -> Result<()> {
        self.inner().detach()
    }
}

impl<C: Connect> Debug for PooledSession<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("is_valid", &self.inner.as_ref().is_some_and(|i| i.is_valid()))
            .finish()
    }
}

/// Backstop for handles that go away without completing the return
/// protocol (for example when an invalidation was refused by the store):
/// the session still goes back to the pool.
impl<C: Connect> Drop for HandleInner<C> {
    fn drop(&mut self) {
        if !self.finalized.load(Ordering::Acquire) {
            self.closed.store(true, Ordering::Release);
            if let Err(e) = self.finalize() {
                tracing::warn!(target: "pool", "error returning session on drop: {e}");
            }
        }
    }
}

/// Returns the checkout unit to the pool; the last one checks the session in.
impl<C: Connect> Drop for PooledSession<C> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            if let Err(e) = inner.release_one() {
                tracing::warn!(target: "pool", "error returning session on drop: {e}");
            }
        }
    }
}
