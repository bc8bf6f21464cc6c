use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    Error, Result,
    carousel::{Carousel, PoolKind, next_pool_id},
    listener::{ListenerHub, PoolListener},
    logger::PoolLogger,
    session::Connect,
};

use super::record::SessionRecord;
use super::store::{self, Store};

/// Shared pool state: configuration, the session factory plumbing, the
/// store of idle records, and the listener hub.
pub(crate) struct PoolInner<C: Connect> {
    pub(crate) id: u64,
    pub(crate) options: Carousel,
    pub(crate) connector: Arc<C>,
    pub(crate) store: Box<dyn Store<C>>,
    pub(crate) listeners: ListenerHub<C::Session>,
    pub(crate) logger: PoolLogger,
    /// Round-robin cursor over `options.servers`, advanced exactly once per
    /// attempted session creation, successful or not. Deliberately just an
    /// atomic increment; under concurrent creation two callers may start
    /// from the same server, which is an accepted weakening.
    cursor: AtomicUsize,
}

impl<C: Connect> PoolInner<C> {
    pub(crate) fn new(
        mut options: Carousel,
        connector: Arc<C>,
        listeners: Vec<Arc<dyn PoolListener<C::Session>>>,
    ) -> Arc<Self> {
        if options.kind == PoolKind::SingletonThread {
            // a per-thread store only makes sense with per-thread handles
            options.use_threadlocal = true;
        }
        let id = next_pool_id();
        let name = options
            .logging_name
            .clone()
            .unwrap_or_else(|| format!("pool-{id}"));
        let logger = PoolLogger::new(name, options.echo);
        let store = store::for_kind::<C>(&options);
        Arc::new(Self {
            id,
            options,
            connector,
            store,
            listeners: ListenerHub::new(listeners),
            logger,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Open a new backend session, failing over across the server list.
    ///
    /// The round-robin cursor picks the primary server; on a connect-class
    /// failure the remaining servers are tried in list order and the first
    /// that opens wins. Non-connect errors propagate immediately.
    pub(crate) fn open_session(&self) -> Result<C::Session> {
        let servers = &self.options.servers;
        if servers.is_empty() {
            return Err(Error::NoServerAvailable {
                attempted: 0,
                last: "server list is empty".into(),
            });
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % servers.len();
        let mut last = None;
        for offset in 0..servers.len() {
            let server = &servers[(start + offset) % servers.len()];
            match self
                .connector
                .open(&self.options.keyspace, server, self.options.credentials.as_ref())
            {
                Ok(session) => {
                    self.logger
                        .event(format_args!("opened session against {server}"));
                    return Ok(session);
                }
                Err(e) if e.is_connect_failure() => {
                    self.logger
                        .notice(format_args!("server {server} failed to open: {e}"));
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::NoServerAvailable {
            attempted: servers.len(),
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Hand a record back to the store after a checkin, dropping the calling
    /// thread's cached handle for this pool first so the next `connect` on
    /// this thread draws fresh.
    pub(crate) fn return_record(&self, record: Arc<SessionRecord<C>>) -> Result<()> {
        if self.options.use_threadlocal {
            super::clear_thread_handle(self.id);
        }
        self.store.release(self, record)
    }
}
