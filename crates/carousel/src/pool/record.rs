use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use crate::{
    Error, Result,
    logger::PoolLogger,
    session::{Connect, Session, SessionInfo},
};

use super::handle::HandleInner;
use super::inner::PoolInner;

/// Long-lived holder of one backend session and its metadata.
///
/// Records are owned by the pool's store and handed to at most one live
/// handle at a time. An empty `slot` means the record was invalidated; it
/// reopens on the next [`ensure_open`](Self::ensure_open).
pub(crate) struct SessionRecord<C: Connect> {
    pub(super) slot: Mutex<Option<C::Session>>,
    /// When the current session was opened; recycling compares against this.
    pub(super) started_at: Mutex<Instant>,
    pub(super) info: Mutex<SessionInfo>,
    /// Back-reference to the live handle, set at checkout and cleared at
    /// checkin or detach.
    holder: Mutex<Option<Weak<HandleInner<C>>>>,
    logger: PoolLogger,
}

impl<C: Connect> SessionRecord<C> {
    /// Open a session eagerly and wrap it in a fresh record. The first open
    /// anywhere in the pool fires the `first_connect` observers, then every
    /// open fires `connect`.
    pub(crate) fn new(pool: &PoolInner<C>) -> Result<Arc<Self>> {
        let mut session = pool.open_session()?;
        let mut info = SessionInfo::new();
        pool.listeners.session_opened(&mut session, &mut info);
        pool.logger.event(format_args!("created new session record"));
        Ok(Arc::new(Self {
            slot: Mutex::new(Some(session)),
            started_at: Mutex::new(Instant::now()),
            info: Mutex::new(info),
            holder: Mutex::new(None),
            logger: pool.logger.clone(),
        }))
    }

    /// Make sure the record holds a live session: reopen after invalidation,
    /// and recycle sessions past their maximum age. Reopening clears the
    /// info bag and fires `connect` observers.
    pub(crate) fn ensure_open(&self, pool: &PoolInner<C>) -> Result<()> {
        let mut slot = self.slot.lock()?;

        if slot.is_none() {
            *slot = Some(self.reopen(pool)?);
            return Ok(());
        }

        if let Some(recycle) = pool.options.recycle {
            if self.started_at.lock()?.elapsed() >= recycle {
                self.logger
                    .notice(format_args!("session exceeded recycle age, recycling"));
                if let Some(mut old) = slot.take() {
                    if let Err(e) = old.close() {
                        self.logger
                            .event(format_args!("session threw an error on close: {e}"));
                    }
                }
                *slot = Some(self.reopen(pool)?);
            }
        }

        Ok(())
    }

    /// Open a replacement session and reset the record's metadata around it.
    /// Callers hold the slot lock.
    fn reopen(&self, pool: &PoolInner<C>) -> Result<C::Session> {
        let mut session = pool.open_session()?;
        let mut info = self.info.lock()?;
        info.clear();
        pool.listeners.session_opened(&mut session, &mut info);
        *self.started_at.lock()? = Instant::now();
        Ok(session)
    }

    /// Best-effort close and clear the session; the record reopens on next
    /// use.
    pub(crate) fn invalidate(&self, cause: Option<&Error>) {
        match cause {
            Some(e) => self
                .logger
                .notice(format_args!("invalidating session (reason: {e})")),
            None => self.logger.notice(format_args!("invalidating session")),
        }
        self.close_quietly();
    }

    /// Best-effort close used by store disposal and discard paths.
    pub(crate) fn close_session(&self) {
        self.logger.event(format_args!("closing session"));
        self.close_quietly();
    }

    fn close_quietly(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut session) = slot.take() {
            if let Err(e) = session.close() {
                self.logger
                    .event(format_args!("session threw an error on close: {e}"));
            }
        }
    }

    /// Move the session out of the record, leaving it to reconnect on its
    /// next acquisition. Used by handle detach.
    pub(crate) fn take_session(&self) -> Option<C::Session> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Shallow copy of the info bag (the `Arc` values are shared).
    pub(crate) fn info_snapshot(&self) -> Result<SessionInfo> {
        Ok(self.info.lock()?.clone())
    }

    pub(crate) fn set_holder(&self, holder: Option<Weak<HandleInner<C>>>) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = holder;
    }

    /// `true` while `handle` is the registered holder of this record.
    /// Pointer-based so it still answers while the handle is being dropped.
    pub(crate) fn held_by(&self, handle: &HandleInner<C>) -> bool {
        self.holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), handle))
    }

}

impl<C: Connect> Drop for SessionRecord<C> {
    fn drop(&mut self) {
        // discarded records (overflow, eviction, a dropped pool) close their
        // session deterministically
        let slot = self
            .slot
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut session) = slot.take() {
            self.logger
                .event(format_args!("closing discarded session"));
            let _ = session.close();
        }
    }
}
