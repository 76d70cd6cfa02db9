//! swimbot-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `swimbot` binary in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod testing;

pub use application::protocol_client::{ClientError, ProtocolClient};
pub use application::service::{spawn, RobotHandle, RobotService};
pub use application::supervisor::{
    ConnectionState, ConnectionSupervisor, DisconnectReason, RetryCounter, SupervisorEvent,
    SupervisorPolicy,
};
pub use infrastructure::transport::{
    Connector, DeviceAddress, TcpConnector, TcpSession, Transport, TransportError,
};
