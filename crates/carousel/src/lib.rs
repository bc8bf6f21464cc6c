//! A synchronous session pool for remote, stateful wire-protocol backends.
//!
//! Sessions are expensive to open (socket, handshake, authentication,
//! keyspace selection) and cheap to reuse. carousel keeps a bounded set of
//! opened sessions, hands them out one holder at a time, resets and recycles
//! them between uses, and fails over across a server list when opening new
//! ones.
//!
//! The backend itself is abstracted behind two small traits: implement
//! [`Session`] for your wire session and [`Connect`] for whatever opens one
//! against a single server, then build a [`Pool`] with [`Carousel`].

/// Connection options and configuration.
mod carousel;
/// Error types and result helpers.
pub mod error;
/// Observer hooks for pool lifecycle events.
mod listener;
/// Pool event emission.
mod logger;
/// The pool, its records, handles, and stores.
mod pool;
/// Capability traits for sessions and connectors.
mod session;

pub use crate::{
    carousel::{Carousel, PoolKind},
    error::{Error, Result},
    listener::PoolListener,
    pool::{Pool, PooledSession},
    session::{Connect, Credentials, Session, SessionInfo},
};
