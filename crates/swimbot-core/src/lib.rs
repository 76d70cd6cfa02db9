//! # swimbot-core
//!
//! Shared library for the swimbot control client containing the binary wire
//! codec and the robot domain types.
//!
//! It has zero dependencies on sockets, async runtimes, or UI frameworks, so
//! everything in here is a pure function or a plain value type.
//!
//! # Architecture overview (for beginners)
//!
//! The robot is an ESP32-driven swimming machine that listens on a TCP port.
//! A controller sends it one small binary command at a time and waits for a
//! one-byte acknowledgment (or an 8-byte status report) before sending the
//! next one.
//!
//! - **`domain`** – The vocabulary of the robot: operating [`Mode`]s,
//!   locomotion [`SwimCommand`]s, tunable [`SwimParameters`], and the
//!   [`RobotStatus`] snapshot returned by a status query.
//!
//! - **`protocol`** – How those values travel over the wire.  Every command
//!   starts with an opcode byte; some carry a fixed-layout payload.  The codec
//!   turns typed [`Command`]s into bytes and response bytes back into typed
//!   [`Ack`]s and [`RobotStatus`]es.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `swimbot_core::Mode` instead of `swimbot_core::domain::robot::Mode`.
pub use domain::robot::{ErrorFlags, Mode, ParseEnumError, RobotStatus, SwimCommand, SwimParameters};
pub use protocol::codec::{decode_ack, decode_status, encode_command, ProtocolError};
pub use protocol::messages::{Ack, Command, NakCode};
