//! Types for working with errors produced by carousel.

use std::io;
use std::sync::PoisonError;
use std::time::Duration;

/// A specialized `Result` type for carousel.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents all the ways a method can fail within carousel.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error communicating with the backend transport.
    ///
    /// Raised by connectors during socket connect or request I/O. Treated as
    /// a connect-class failure during session creation, making the pool fail
    /// over to the next server in its list.
    #[error("error communicating with backend: {0}")]
    Io(#[from] io::Error),

    /// Unexpected or invalid data encountered on the wire.
    ///
    /// Connect-class when raised during session creation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend rejected the supplied credentials or keyspace.
    ///
    /// Connect-class when raised during session creation.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Every server in the list failed to open a session.
    ///
    /// Never retried internally; surfaces from session acquisition.
    #[error("no server available: all {attempted} servers failed to open (last error: {last})")]
    NoServerAvailable { attempted: usize, last: String },

    /// A bounded-queue pool exhausted its capacity and overflow, and the
    /// wait for a released session elapsed.
    #[error("pool size {size} overflow {overflow} reached, session wait timed out after {timeout:?}")]
    PoolTimedOut {
        size: u32,
        overflow: i64,
        timeout: Duration,
    },

    /// A disconnect was detected on a checked-out session.
    ///
    /// Returned by a [`PoolListener::checkout`](crate::PoolListener::checkout)
    /// implementation so that the host pool invalidates the session and
    /// retries with a fresh one. Consumed internally by the pool.
    #[error("disconnection detected on checkout: {message}")]
    Disconnection { message: String },

    /// The pool was asked to do something it can't do.
    ///
    /// This generally corresponds to runtime state errors, like operating on
    /// a closed session handle.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Misuse detected by an assertion pool.
    #[error("assertion: {0}")]
    Assertion(String),

    /// An internal lock was poisoned by a panicked thread.
    #[error("internal pool state poisoned by a panicked thread")]
    Poisoned,
}

impl Error {
    /// Build an [`Error::Disconnection`] from any displayable cause. The
    /// message carries the cause through the pool's invalidate-and-retry
    /// path and into its event stream.
    pub fn disconnection(cause: impl std::fmt::Display) -> Self {
        Error::Disconnection {
            message: cause.to_string(),
        }
    }

    /// `true` for failures that the session factory treats as "this server
    /// is down, try the next one" rather than propagating.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Protocol(_) | Error::Authentication(_)
        )
    }

    /// The error raised by any operation on a closed session handle.
    pub(crate) fn closed() -> Self {
        Error::InvalidRequest("this session handle is closed".into())
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::Poisoned
    }
}
