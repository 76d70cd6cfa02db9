//! Infrastructure layer of the swimbot client.
//!
//! Contains OS-facing adapters: the TCP transport to the robot and
//! file-system storage for the configuration.

pub mod storage;
pub mod transport;
