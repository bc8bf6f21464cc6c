//! Capability traits for backend sessions and the connectors that open them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::Result;

/// Caller-owned scratch metadata attached to a pooled session record.
///
/// The bag lives as long as its session: it is cleared whenever the record
/// opens a fresh session, and shallow-copied (the `Arc` values are cloned,
/// not their contents) onto the handle by
/// [`PooledSession::detach`](crate::PooledSession::detach).
pub type SessionInfo = IndexMap<String, Arc<dyn Any + Send + Sync>>;

/// Authentication material handed through to a [`Connect`] implementation.
/// The pool never inspects it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An open backend session.
///
/// The pool requires only this small capability set. Every request operation
/// your session type offers beyond it is reached through
/// [`PooledSession::with_session`](crate::PooledSession::with_session).
pub trait Session: Send + 'static {
    /// Terminate the session, releasing any server-side resources.
    ///
    /// Must be safe to call more than once; the pool swallows errors from
    /// redundant closes during best-effort cleanup.
    fn close(&mut self) -> Result<()>;

    /// Best-effort reset of server-side state, issued before a session is
    /// returned to the pool when `reset_on_return` is enabled.
    ///
    /// The default implementation does nothing, which is appropriate for
    /// backends without transactional state.
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens new sessions against a single backend server.
///
/// An implementation performs the full setup for one `host:port` server:
/// socket connect, protocol handshake, authentication, and keyspace
/// selection. Failures reported as [`Error::Io`](crate::Error::Io),
/// [`Error::Protocol`](crate::Error::Protocol) or
/// [`Error::Authentication`](crate::Error::Authentication) mean "this server
/// is down" and make the pool fail over to the next server in its list; any
/// other error propagates to the caller unchanged.
pub trait Connect: Send + Sync + 'static {
    type Session: Session;

    fn open(
        &self,
        keyspace: &str,
        server: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Self::Session>;
}
