//! In-memory backend doubles for exercising carousel pools.
//!
//! [`TestConnect`] plays the part of a server fleet: sessions open
//! instantly, servers can be marked down or hostile, and shared counters see
//! every open, close, and rollback. Cloning a `TestConnect` shares all of
//! its state, so keep a clone when handing one to a pool.

use std::collections::HashSet;
use std::io;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use carousel::{Carousel, Connect, Credentials, Error, Pool, Result, Session};

#[derive(Default)]
struct Shared {
    seq: AtomicU64,
    created: AtomicUsize,
    closed: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_rollbacks: AtomicBool,
    attempts: Mutex<Vec<String>>,
    down: Mutex<HashSet<String>>,
    fatal: Mutex<HashSet<String>>,
}

/// A fake backend session with a unique id and shared outcome counters.
pub struct TestSession {
    id: u64,
    server: String,
    shared: Arc<Shared>,
    closed: bool,
}

impl TestSession {
    /// Unique id of this session, assigned at open in order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The server this session was opened against.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Pretend to run one request against the backend.
    pub fn ping(&mut self) -> Result<u64> {
        if self.closed {
            return Err(Error::Protocol("session is closed".into()));
        }
        Ok(self.id)
    }
}

impl Session for TestSession {
    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.shared.fail_rollbacks.load(Ordering::SeqCst) {
            return Err(Error::Protocol("rollback refused".into()));
        }
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A connector over an imaginary server fleet.
#[derive(Clone, Default)]
pub struct TestConnect {
    shared: Arc<Shared>,
}

impl TestConnect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a server down. Opens against it fail with a connect-class I/O
    /// error, which pools respond to by failing over.
    pub fn set_down(&self, server: &str, down: bool) {
        let mut set = self.shared.down.lock().unwrap();
        if down {
            set.insert(server.to_string());
        } else {
            set.remove(server);
        }
    }

    /// Mark a server hostile. Opens against it fail with a non-connect
    /// error, which pools propagate without failing over.
    pub fn set_fatal(&self, server: &str, fatal: bool) {
        let mut set = self.shared.fatal.lock().unwrap();
        if fatal {
            set.insert(server.to_string());
        } else {
            set.remove(server);
        }
    }

    /// Make every subsequent rollback fail.
    pub fn fail_rollbacks(&self, on: bool) {
        self.shared.fail_rollbacks.store(on, Ordering::SeqCst);
    }

    /// Sessions opened successfully so far.
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Successful rollbacks so far.
    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    /// Every server an open was attempted against, in order, including
    /// attempts that failed.
    pub fn attempts(&self) -> Vec<String> {
        self.shared.attempts.lock().unwrap().clone()
    }
}

impl Connect for TestConnect {
    type Session = TestSession;

    fn open(
        &self,
        _keyspace: &str,
        server: &str,
        _credentials: Option<&Credentials>,
    ) -> Result<TestSession> {
        self.shared.attempts.lock().unwrap().push(server.to_string());
        if self.shared.fatal.lock().unwrap().contains(server) {
            return Err(Error::InvalidRequest(format!(
                "{server} rejected the request"
            )));
        }
        if self.shared.down.lock().unwrap().contains(server) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{server} refused the connection"),
            )));
        }
        let id = self.shared.seq.fetch_add(1, Ordering::SeqCst);
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(TestSession {
            id,
            server: server.to_string(),
            shared: Arc::clone(&self.shared),
            closed: false,
        })
    }
}

/// A pool over the imaginary fleet, plus the connector so tests can watch
/// the counters.
pub fn pool(options: Carousel) -> (Pool<TestConnect>, TestConnect) {
    let connect = TestConnect::new();
    (options.build(connect.clone()), connect)
}

/// Check a session out, ping it, and return the session id.
pub fn ping_once(pool: &Pool<TestConnect>) -> anyhow::Result<u64> {
    let handle = pool.connect()?;
    let id = handle.with_session(|session| session.ping())??;
    Ok(id)
}
