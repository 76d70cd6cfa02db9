//! Command and response types of the swimbot wire protocol.
//!
//! The protocol is strictly request/response: the controller writes one
//! [`Command`] and the device answers with exactly one response, either a
//! single acknowledgment byte or an 8-byte status report.

use serde::{Deserialize, Serialize};

use crate::domain::robot::{Mode, SwimCommand, SwimParameters};

// ── Protocol constants ────────────────────────────────────────────────────────

/// High nibble of a SetMode opcode; the low nibble carries the [`Mode`].
pub const OPCODE_SET_MODE: u8 = 0x10;

/// Opcode of a SendParameters command (followed by a 10-byte payload).
pub const OPCODE_SEND_PARAMETERS: u8 = 0x20;

/// High nibble of a SwimCommand opcode; the low nibble carries the command.
pub const OPCODE_SWIM_COMMAND: u8 = 0x50;

/// Opcode of a QueryStatus command.
pub const OPCODE_QUERY_STATUS: u8 = 0xF0;

/// Payload size of SendParameters, excluding the opcode byte.
pub const PARAMETERS_PAYLOAD_SIZE: usize = 10;

/// Minimum size of a status response.  Bytes 4..8 are reserved.
pub const STATUS_RESPONSE_SIZE: usize = 8;

/// Ack bit: set in byte 0 of an acknowledgment means the command failed.
pub const ACK_FAILURE_BIT: u8 = 0x80;

// ── Commands ──────────────────────────────────────────────────────────────────

/// One request the controller can send to the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    SetMode(Mode),
    SwimCommand(SwimCommand),
    SendParameters(SwimParameters),
    QueryStatus,
}

impl Command {
    /// Short operation name for log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetMode(_) => "set_mode",
            Command::SwimCommand(_) => "swim_command",
            Command::SendParameters(_) => "send_parameters",
            Command::QueryStatus => "query_status",
        }
    }

    /// Returns `true` if the device answers this command with an ack byte
    /// rather than a status report.
    pub fn expects_ack(&self) -> bool {
        !matches!(self, Command::QueryStatus)
    }
}

// ── Acknowledgments ───────────────────────────────────────────────────────────

/// Failure codes the device firmware places in a rejected acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NakCode {
    /// `0xE0` – the opcode's high nibble is not a known command.
    UnknownCommand,
    /// `0xE1` – SetMode carried a mode outside 0–5.
    InvalidMode,
    /// `0xE2` – SendParameters values failed device-side validation.
    InvalidParameters,
    /// `0xE3` – SendParameters payload arrived short.
    TruncatedParameters,
    /// Any other byte with the ack bit set.
    Other(u8),
}

impl NakCode {
    /// Classifies a response byte whose ack bit is set.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xE0 => NakCode::UnknownCommand,
            0xE1 => NakCode::InvalidMode,
            0xE2 => NakCode::InvalidParameters,
            0xE3 => NakCode::TruncatedParameters,
            other => NakCode::Other(other),
        }
    }

    /// Returns the byte the device sends for this code.
    pub fn to_byte(self) -> u8 {
        match self {
            NakCode::UnknownCommand => 0xE0,
            NakCode::InvalidMode => 0xE1,
            NakCode::InvalidParameters => 0xE2,
            NakCode::TruncatedParameters => 0xE3,
            NakCode::Other(b) => b | ACK_FAILURE_BIT,
        }
    }
}

/// Decoded acknowledgment for SetMode, SwimCommand, and SendParameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    /// Ack bit clear: the device applied the command.
    Accepted,
    /// Ack bit set: the device refused the command.
    Rejected(NakCode),
}

impl Ack {
    pub fn is_accepted(self) -> bool {
        matches!(self, Ack::Accepted)
    }
}
