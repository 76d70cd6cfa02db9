//! Transport layer: one TCP session to the robot and the factory that opens it.
//!
//! The application layer only sees the [`Transport`] and [`Connector`]
//! traits.  [`tcp`] provides the real socket implementation; tests substitute
//! in-memory fakes so the supervisor's state machine can be driven without a
//! network.
//!
//! # Session lifetime
//!
//! A session is single-use with respect to failure: once `request` returns an
//! error, the session has already dropped its socket and every further call
//! fails with [`TransportError::Closed`].  Recovering means asking the
//! [`Connector`] for a brand-new session.

pub mod tcp;

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tcp::{TcpConnector, TcpSession};

/// Default TCP port the robot firmware listens on.
pub const DEFAULT_DEVICE_PORT: u16 = 8000;

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The TCP handshake did not finish within the connect timeout.
    #[error("connecting to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    /// The device actively refused the connection (nothing listening).
    #[error("connection to {address} refused")]
    ConnectRefused { address: String },

    /// The device did not answer a request within the operation timeout.
    #[error("no response within {0:?}")]
    OperationTimeout(Duration),

    /// The device reset or closed the connection mid-exchange.
    #[error("connection reset by device")]
    ConnectionReset,

    /// The session was closed earlier and cannot carry more requests.
    #[error("session is closed")]
    Closed,

    /// Any other socket-level failure, including name resolution.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Maps an I/O error raised on an established connection.
    pub(crate) fn from_exchange(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::ConnectionReset,
            _ => TransportError::Io(err),
        }
    }
}

/// Host and port of the robot's control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress {
    /// IP address or hostname.
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One live connection to the robot.
///
/// Implementations must guarantee that every call returns by its deadline,
/// even if the peer never answers.
#[async_trait]
pub trait Transport: Send {
    /// Writes `message` in full, then waits for exactly one response.
    ///
    /// The whole exchange is bounded by `timeout`.  On any error the session
    /// closes itself before returning.
    async fn request(&mut self, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Shuts the connection down.  Never fails and may be called repeatedly.
    async fn close(&mut self);

    /// Returns `false` once the session has been closed or has failed.
    fn is_open(&self) -> bool;
}

/// Opens fresh [`Transport`] sessions.
///
/// `open` must return within `timeout`, succeeding only once the connection
/// is fully established.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
