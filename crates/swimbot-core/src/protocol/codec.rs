//! Binary codec for the swimbot control protocol.
//!
//! Wire format of the four commands:
//! ```text
//! SetMode         [0x10 | mode]
//! SwimCommand     [0x50 | command]
//! SendParameters  [0x20][period:f32][wing_x10:i16][max_angle_x10:i16][y_rate_x100:i8][backward:u8]
//! QueryStatus     [0xF0]
//! ```
//! Responses:
//! ```text
//! Ack             [code:u8]                       top bit clear = accepted
//! Status          [mode:u8][angle_x10:i16][flags:u8][reserved:4]
//! ```
//! All multi-byte fields are little-endian.  This is a fixed convention shared
//! with the device firmware, not something negotiated per connection.

use thiserror::Error;

use crate::domain::robot::{ErrorFlags, Mode, RobotStatus, SwimCommand, SwimParameters};
use crate::protocol::messages::{
    Ack, Command, NakCode, ACK_FAILURE_BIT, OPCODE_QUERY_STATUS, OPCODE_SEND_PARAMETERS,
    OPCODE_SET_MODE, OPCODE_SWIM_COMMAND, PARAMETERS_PAYLOAD_SIZE, STATUS_RESPONSE_SIZE,
};

/// Errors that can occur while decoding protocol bytes.
///
/// Encoding is infallible: every [`Command`] has a fixed layout.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// The byte slice is shorter than the layout requires.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A status response carried a mode byte outside 0–5.
    #[error("invalid mode value: {0}")]
    InvalidMode(u8),

    /// A SwimCommand opcode carried a command outside 0–4.
    #[error("invalid swim command value: {0}")]
    InvalidSwimCommand(u8),

    /// The leading byte of a command is not a known opcode.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Command`] into the bytes written to the socket.
///
/// # Examples
///
/// ```rust
/// use swimbot_core::{encode_command, Command, Mode, SwimCommand};
///
/// assert_eq!(encode_command(&Command::SetMode(Mode::Swim)), vec![0x13]);
/// assert_eq!(encode_command(&Command::SwimCommand(SwimCommand::TurnLeft)), vec![0x51]);
/// ```
pub fn encode_command(command: &Command) -> Vec<u8> {
    match command {
        Command::SetMode(mode) => vec![OPCODE_SET_MODE | *mode as u8],
        Command::SwimCommand(cmd) => vec![OPCODE_SWIM_COMMAND | *cmd as u8],
        Command::SendParameters(params) => {
            let mut buf = Vec::with_capacity(1 + PARAMETERS_PAYLOAD_SIZE);
            buf.push(OPCODE_SEND_PARAMETERS);
            encode_parameters(&mut buf, params);
            buf
        }
        Command::QueryStatus => vec![OPCODE_QUERY_STATUS],
    }
}

/// Decodes the acknowledgment returned for SetMode, SwimCommand, and
/// SendParameters.
///
/// Only byte 0 is inspected; trailing bytes are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when `bytes` is empty.
///
/// # Examples
///
/// ```rust
/// use swimbot_core::{decode_ack, Ack, NakCode};
///
/// assert_eq!(decode_ack(&[0x00]).unwrap(), Ack::Accepted);
/// assert_eq!(decode_ack(&[0xE1]).unwrap(), Ack::Rejected(NakCode::InvalidMode));
/// assert!(decode_ack(&[]).is_err());
/// ```
pub fn decode_ack(bytes: &[u8]) -> Result<Ack, ProtocolError> {
    require_len(bytes, 1)?;
    let code = bytes[0];
    if code & ACK_FAILURE_BIT == 0 {
        Ok(Ack::Accepted)
    } else {
        Ok(Ack::Rejected(NakCode::from_byte(code)))
    }
}

/// Decodes a status response into a [`RobotStatus`].
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] for responses shorter than
/// eight bytes and [`ProtocolError::InvalidMode`] when byte 0 is not a mode.
pub fn decode_status(bytes: &[u8]) -> Result<RobotStatus, ProtocolError> {
    require_len(bytes, STATUS_RESPONSE_SIZE)?;
    let mode = Mode::try_from(bytes[0]).map_err(|_| ProtocolError::InvalidMode(bytes[0]))?;
    let angle_x10 = i16::from_le_bytes([bytes[1], bytes[2]]);
    let flags = ErrorFlags(bytes[3]);
    // bytes[4..8] are reserved – ignored on decode
    Ok(RobotStatus {
        mode,
        current_angle_deg: f32::from(angle_x10) / 10.0,
        wifi_disconnected: flags.wifi_disconnected(),
        angle_out_of_range: flags.angle_out_of_range(),
    })
}

/// Encodes a [`RobotStatus`] the way the device reports it.
///
/// The reserved bytes are zero.  This is the inverse of [`decode_status`].
pub fn encode_status(status: &RobotStatus) -> [u8; STATUS_RESPONSE_SIZE] {
    let mut buf = [0u8; STATUS_RESPONSE_SIZE];
    buf[0] = status.mode as u8;
    buf[1..3].copy_from_slice(&quantize_i16(status.current_angle_deg, 10.0).to_le_bytes());
    buf[3] = status.error_flags().0;
    buf
}

/// Decodes the 10-byte SendParameters payload (the bytes after the opcode).
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than ten bytes are
/// available.
pub fn decode_parameters(payload: &[u8]) -> Result<SwimParameters, ProtocolError> {
    require_len(payload, PARAMETERS_PAYLOAD_SIZE)?;
    let period_sec = f32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let wing_x10 = i16::from_le_bytes([payload[4], payload[5]]);
    let max_angle_x10 = i16::from_le_bytes([payload[6], payload[7]]);
    let y_rate_x100 = payload[8] as i8;
    Ok(SwimParameters {
        period_sec,
        wing_deg: f32::from(wing_x10) / 10.0,
        max_angle_deg: f32::from(max_angle_x10) / 10.0,
        y_rate: f32::from(y_rate_x100) / 100.0,
        is_backward: payload[9] != 0,
    })
}

/// Decodes one command from the beginning of `bytes`.
///
/// Returns the command and the number of bytes consumed so a device-side
/// reader can advance its cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the opcode is unknown, the packed value is
/// out of range, or the parameters payload is incomplete.
pub fn decode_command(bytes: &[u8]) -> Result<(Command, usize), ProtocolError> {
    require_len(bytes, 1)?;
    let opcode = bytes[0];
    let low = opcode & 0x0F;
    match opcode & 0xF0 {
        OPCODE_SET_MODE => {
            let mode = Mode::try_from(low).map_err(|_| ProtocolError::InvalidMode(low))?;
            Ok((Command::SetMode(mode), 1))
        }
        OPCODE_SWIM_COMMAND => {
            let cmd = SwimCommand::try_from(low).map_err(|_| ProtocolError::InvalidSwimCommand(low))?;
            Ok((Command::SwimCommand(cmd), 1))
        }
        _ if opcode == OPCODE_SEND_PARAMETERS => {
            let total = 1 + PARAMETERS_PAYLOAD_SIZE;
            require_len(bytes, total)?;
            let params = decode_parameters(&bytes[1..total])?;
            Ok((Command::SendParameters(params), total))
        }
        _ if opcode == OPCODE_QUERY_STATUS => Ok((Command::QueryStatus, 1)),
        _ => Err(ProtocolError::UnknownOpcode(opcode)),
    }
}

// ── Payload helpers ───────────────────────────────────────────────────────────

fn encode_parameters(buf: &mut Vec<u8>, p: &SwimParameters) {
    buf.extend_from_slice(&p.period_sec.to_le_bytes());
    buf.extend_from_slice(&quantize_i16(p.wing_deg, 10.0).to_le_bytes());
    buf.extend_from_slice(&quantize_i16(p.max_angle_deg, 10.0).to_le_bytes());
    buf.push(quantize_i8(p.y_rate, 100.0) as u8);
    buf.push(u8::from(p.is_backward));
}

/// Rounds `value * scale` to the nearest integer, saturating at the i16 bounds.
fn quantize_i16(value: f32, scale: f32) -> i16 {
    // `as` saturates on overflow and maps NaN to 0.
    (value * scale).round() as i16
}

fn quantize_i8(value: f32, scale: f32) -> i8 {
    (value * scale).round() as i8
}

fn require_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::InsufficientData {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
