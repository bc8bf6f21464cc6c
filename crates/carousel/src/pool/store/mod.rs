//! Idle-record stores, one per pooling policy.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    Error, Result,
    carousel::{Carousel, PoolKind},
    session::Connect,
};

use super::inner::PoolInner;
use super::record::SessionRecord;

mod queue;
mod singleton;

/// Policy-defined store of idle records.
///
/// At every instant a record is either resting here or owned by exactly one
/// live handle, never both.
pub(crate) trait Store<C: Connect>: Send + Sync {
    /// Check a record out of the store, creating one where policy allows.
    fn acquire(&self, pool: &PoolInner<C>) -> Result<Arc<SessionRecord<C>>>;

    /// Return a record to the store.
    fn release(&self, pool: &PoolInner<C>, record: Arc<SessionRecord<C>>) -> Result<()>;

    /// Close and drop every idle record.
    fn dispose(&self, pool: &PoolInner<C>);

    /// Drop state owned by the calling thread. Only meaningful for
    /// per-thread stores.
    fn dispose_local(&self, pool: &PoolInner<C>) {
        let _ = pool;
    }

    /// One-line snapshot of the store state.
    fn status(&self, pool: &PoolInner<C>) -> String;

    /// Live records this store accounts for.
    fn size(&self) -> u32;

    /// Records currently resting in the store.
    fn num_idle(&self) -> usize;

    /// Whether record invalidation is supported.
    fn allows_invalidate(&self) -> bool {
        true
    }
}

pub(crate) fn for_kind<C: Connect>(options: &Carousel) -> Box<dyn Store<C>> {
    match options.kind {
        PoolKind::Queue => Box::new(queue::QueueStore::<C>::new(options)),
        PoolKind::SingletonThread => {
            Box::new(singleton::SingletonThreadStore::<C>::new(options))
        }
        PoolKind::Null => Box::new(NullStore),
        PoolKind::Static => Box::new(StaticStore::<C>::new()),
        PoolKind::Assertion => Box::new(AssertionStore::<C>::new()),
    }
}

/// No pooling: open per acquire, close per release.
struct NullStore;

impl<C: Connect> Store<C> for NullStore {
    fn acquire(&self, pool: &PoolInner<C>) -> Result<Arc<SessionRecord<C>>> {
        SessionRecord::new(pool)
    }

    fn release(&self, _pool: &PoolInner<C>, record: Arc<SessionRecord<C>>) -> Result<()> {
        record.close_session();
        Ok(())
    }

    fn dispose(&self, _pool: &PoolInner<C>) {}

    fn status(&self, _pool: &PoolInner<C>) -> String {
        "NullPool".into()
    }

    fn size(&self) -> u32 {
        0
    }

    fn num_idle(&self) -> usize {
        0
    }
}

/// A single lazily-created record shared by every acquisition.
struct StaticStore<C: Connect> {
    record: Mutex<Option<Arc<SessionRecord<C>>>>,
}

impl<C: Connect> StaticStore<C> {
    fn new() -> Self {
        Self {
            record: Mutex::new(None),
        }
    }
}

impl<C: Connect> Store<C> for StaticStore<C> {
    fn acquire(&self, pool: &PoolInner<C>) -> Result<Arc<SessionRecord<C>>> {
        let mut record = self.record.lock()?;
        if let Some(record) = &*record {
            return Ok(Arc::clone(record));
        }
        let fresh = SessionRecord::new(pool)?;
        *record = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    fn release(&self, _pool: &PoolInner<C>, _record: Arc<SessionRecord<C>>) -> Result<()> {
        Ok(())
    }

    fn dispose(&self, _pool: &PoolInner<C>) {
        if let Some(record) = self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            record.close_session();
        }
    }

    fn status(&self, _pool: &PoolInner<C>) -> String {
        "StaticPool".into()
    }

    fn size(&self) -> u32 {
        u32::from(
            self.record
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
        )
    }

    fn num_idle(&self) -> usize {
        <Self as Store<C>>::size(self) as usize
    }

    fn allows_invalidate(&self) -> bool {
        false
    }
}

/// At most one record checked out at a time; misuse fails loudly.
struct AssertionStore<C: Connect> {
    record: Mutex<Option<Arc<SessionRecord<C>>>>,
    checked_out: Mutex<bool>,
}

impl<C: Connect> AssertionStore<C> {
    fn new() -> Self {
        Self {
            record: Mutex::new(None),
            checked_out: Mutex::new(false),
        }
    }
}

impl<C: Connect> Store<C> for AssertionStore<C> {
    fn acquire(&self, pool: &PoolInner<C>) -> Result<Arc<SessionRecord<C>>> {
        let mut checked_out = self.checked_out.lock()?;
        if *checked_out {
            return Err(Error::Assertion("session is already checked out".into()));
        }
        let mut record = self.record.lock()?;
        let handout = match &*record {
            Some(record) => Arc::clone(record),
            None => {
                let fresh = SessionRecord::new(pool)?;
                *record = Some(Arc::clone(&fresh));
                fresh
            }
        };
        *checked_out = true;
        Ok(handout)
    }

    fn release(&self, _pool: &PoolInner<C>, record: Arc<SessionRecord<C>>) -> Result<()> {
        let mut checked_out = self.checked_out.lock()?;
        if !*checked_out {
            return Err(Error::Assertion("session is not checked out".into()));
        }
        *checked_out = false;
        let ours = self.record.lock()?;
        if let Some(ours) = &*ours {
            if !Arc::ptr_eq(ours, &record) {
                return Err(Error::Assertion(
                    "returned session does not belong to this pool".into(),
                ));
            }
        }
        Ok(())
    }

    fn dispose(&self, _pool: &PoolInner<C>) {
        *self
            .checked_out
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = false;
        if let Some(record) = self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            record.close_session();
        }
    }

    fn status(&self, _pool: &PoolInner<C>) -> String {
        "AssertionPool".into()
    }

    fn size(&self) -> u32 {
        u32::from(
            self.record
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
        )
    }

    fn num_idle(&self) -> usize {
        let out = *self
            .checked_out
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if out {
            0
        } else {
            <Self as Store<C>>::size(self) as usize
        }
    }
}
