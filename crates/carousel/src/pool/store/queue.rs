//! The bounded-queue store: a FIFO of idle records with a capped overflow
//! of short-lived extras.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use event_listener::{Event, Listener};

use crate::{Error, Result, carousel::Carousel, session::Connect};

use super::Store;
use crate::pool::{inner::PoolInner, record::SessionRecord};

pub(super) struct QueueStore<C: Connect> {
    /// Idle records in FIFO order. `None` when `pool_size` is zero; every
    /// release then discards its record, degenerating to per-use sessions.
    idle: Option<ArrayQueue<Arc<SessionRecord<C>>>>,
    pool_size: u32,
    max_overflow: i32,
    timeout: Duration,
    /// Live records minus `pool_size`, so it starts at `-pool_size` and
    /// `pool_size + overflow` is the live-record count. Guarded by a mutex
    /// because creation capacity is reserved against it.
    overflow: Mutex<i64>,
    /// Notified once per release (or discard, which frees creation
    /// capacity). Listeners are woken in registration order.
    released: Event,
}

impl<C: Connect> QueueStore<C> {
    pub(super) fn new(options: &Carousel) -> Self {
        Self {
            idle: (options.pool_size > 0).then(|| ArrayQueue::new(options.pool_size as usize)),
            pool_size: options.pool_size,
            max_overflow: options.max_overflow,
            timeout: options.timeout,
            overflow: Mutex::new(-i64::from(options.pool_size)),
            released: Event::new(),
        }
    }

    fn pop_idle(&self) -> Option<Arc<SessionRecord<C>>> {
        self.idle.as_ref().and_then(|queue| queue.pop())
    }

    fn overflow_value(&self) -> i64 {
        *self.overflow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve one unit of creation capacity, if any remains. The
    /// reservation keeps racing acquirers from over-creating while the slow
    /// connect happens outside the lock; a failed connect rolls it back.
    fn try_reserve(&self) -> Result<bool> {
        let mut overflow = self.overflow.lock()?;
        if self.max_overflow < 0 || *overflow < i64::from(self.max_overflow) {
            *overflow += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn cancel_reservation(&self) {
        *self.overflow.lock().unwrap_or_else(PoisonError::into_inner) -= 1;
        // the freed capacity may unblock a waiter
        self.released.notify(1);
    }

    fn checked_in(&self) -> usize {
        self.idle.as_ref().map_or(0, |queue| queue.len())
    }

    fn checked_out(&self) -> i64 {
        i64::from(self.pool_size) - self.checked_in() as i64 + self.overflow_value()
    }
}

impl<C: Connect> Store<C> for QueueStore<C> {
    fn acquire(&self, pool: &PoolInner<C>) -> Result<Arc<SessionRecord<C>>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(record) = self.pop_idle() {
                return Ok(record);
            }

            if self.try_reserve()? {
                match SessionRecord::new(pool) {
                    Ok(record) => return Ok(record),
                    Err(e) => {
                        self.cancel_reservation();
                        return Err(e);
                    }
                }
            }

            // at capacity: wait for a release, then race for it
            let listener = self.released.listen();
            if let Some(record) = self.pop_idle() {
                return Ok(record);
            }
            if listener.wait_deadline(deadline).is_none() {
                return Err(Error::PoolTimedOut {
                    size: self.pool_size,
                    overflow: self.overflow_value(),
                    timeout: self.timeout,
                });
            }
        }
    }

    fn release(&self, pool: &PoolInner<C>, record: Arc<SessionRecord<C>>) -> Result<()> {
        let overflowed = match &self.idle {
            Some(queue) => queue.push(record).err(),
            None => Some(record),
        };
        if let Some(record) = overflowed {
            // the idle queue is full; the extra closes on drop
            *self.overflow.lock()? -= 1;
            pool.logger
                .event(format_args!("idle queue full, discarding session"));
            drop(record);
        }
        self.released.notify(1);
        Ok(())
    }

    fn dispose(&self, pool: &PoolInner<C>) {
        while let Some(record) = self.pop_idle() {
            record.close_session();
        }
        *self.overflow.lock().unwrap_or_else(PoisonError::into_inner) =
            -i64::from(self.pool_size);
        pool.logger
            .notice(format_args!("pool disposed: {}", self.status(pool)));
    }

    fn status(&self, _pool: &PoolInner<C>) -> String {
        format!(
            "Pool size: {}  Sessions in pool: {}  Current overflow: {}  Checked out sessions: {}",
            self.pool_size,
            self.checked_in(),
            self.overflow_value(),
            self.checked_out(),
        )
    }

    fn size(&self) -> u32 {
        (i64::from(self.pool_size) + self.overflow_value()).max(0) as u32
    }

    fn num_idle(&self) -> usize {
        self.checked_in()
    }
}
