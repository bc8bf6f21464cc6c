//! One session record per thread, never shared across threads.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::{Result, carousel::Carousel, session::Connect};

use super::Store;
use crate::pool::{inner::PoolInner, record::SessionRecord};

thread_local! {
    /// The calling thread's record, per pool id. Weak references only; the
    /// strong ones live in `SingletonThreadStore::all_records` and in the
    /// handle currently checked out.
    static THREAD_RECORDS: RefCell<HashMap<u64, Weak<dyn Any + Send + Sync>>> =
        RefCell::new(HashMap::new());
}

pub(super) struct SingletonThreadStore<C: Connect> {
    /// Strong references to every thread's record, capped at `pool_size`.
    all_records: Mutex<Vec<Arc<SessionRecord<C>>>>,
    pool_size: usize,
}

impl<C: Connect> SingletonThreadStore<C> {
    pub(super) fn new(options: &Carousel) -> Self {
        Self {
            all_records: Mutex::new(Vec::new()),
            pool_size: options.pool_size as usize,
        }
    }

    fn cached(&self, pool_id: u64) -> Option<Arc<SessionRecord<C>>> {
        THREAD_RECORDS.with(|records| {
            let records = records.borrow();
            records
                .get(&pool_id)?
                .upgrade()?
                .downcast::<SessionRecord<C>>()
                .ok()
        })
    }

    fn remember(&self, pool_id: u64, record: &Arc<SessionRecord<C>>) {
        let record_any: Arc<dyn Any + Send + Sync> = record.clone();
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&record_any);
        THREAD_RECORDS.with(|records| {
            records.borrow_mut().insert(pool_id, weak);
        });
    }

    fn record_count(&self) -> usize {
        self.all_records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<C: Connect> Store<C> for SingletonThreadStore<C> {
    fn acquire(&self, pool: &PoolInner<C>) -> Result<Arc<SessionRecord<C>>> {
        if let Some(record) = self.cached(pool.id) {
            return Ok(record);
        }

        let record = SessionRecord::new(pool)?;
        self.remember(pool.id, &record);

        let mut all = self.all_records.lock()?;
        all.push(Arc::clone(&record));
        if all.len() > self.pool_size {
            // evict the oldest extras; each closes once its thread lets go
            let excess = all.len() - self.pool_size;
            all.drain(..excess);
            pool.logger
                .event(format_args!("evicted {excess} surplus thread sessions"));
        }
        Ok(record)
    }

    fn release(&self, _pool: &PoolInner<C>, _record: Arc<SessionRecord<C>>) -> Result<()> {
        // records live on in their thread slot
        Ok(())
    }

    fn dispose(&self, _pool: &PoolInner<C>) {
        let mut all = self
            .all_records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for record in all.drain(..) {
            record.close_session();
        }
    }

    fn dispose_local(&self, pool: &PoolInner<C>) {
        let cached = THREAD_RECORDS
            .with(|records| records.borrow_mut().remove(&pool.id))
            .and_then(|weak| weak.upgrade())
            .and_then(|any| any.downcast::<SessionRecord<C>>().ok());
        if let Some(record) = cached {
            let mut all = self
                .all_records
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            all.retain(|candidate| !Arc::ptr_eq(candidate, &record));
        }
    }

    fn status(&self, pool: &PoolInner<C>) -> String {
        format!(
            "SingletonThreadPool {} size: {}",
            pool.logger.name(),
            self.record_count(),
        )
    }

    fn size(&self) -> u32 {
        self.record_count() as u32
    }

    fn num_idle(&self) -> usize {
        self.record_count()
    }
}
