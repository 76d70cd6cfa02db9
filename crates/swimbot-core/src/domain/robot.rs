//! Robot vocabulary: operating modes, swim commands, parameters, and status.
//!
//! These types carry no knowledge of bytes or sockets.  The numeric values of
//! [`Mode`] and [`SwimCommand`] are nevertheless fixed because the codec packs
//! them into the low nibble of an opcode byte.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Operating mode ────────────────────────────────────────────────────────────

/// Device operating mode, sent as an integer 0–5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    /// All servos de-energised.
    ServoOff = 0,
    /// Move to the neutral initial pose.
    InitPose = 1,
    /// Hold position in the water.
    Stay = 2,
    /// Run the flapping gait using the current [`SwimParameters`].
    Swim = 3,
    /// Raise the wings.
    Raise = 4,
    /// Abort everything and surface.
    EmergencySurface = 5,
}

impl Mode {
    /// All modes in wire order.
    pub const ALL: [Mode; 6] = [
        Mode::ServoOff,
        Mode::InitPose,
        Mode::Stay,
        Mode::Swim,
        Mode::Raise,
        Mode::EmergencySurface,
    ];

    /// Returns the kebab-case name used on the command line and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Mode::ServoOff => "servo-off",
            Mode::InitPose => "init-pose",
            Mode::Stay => "stay",
            Mode::Swim => "swim",
            Mode::Raise => "raise",
            Mode::EmergencySurface => "emergency-surface",
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Mode::ALL.get(value as usize).copied().ok_or(())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError::new("mode", s))
    }
}

// ── Swim command ──────────────────────────────────────────────────────────────

/// Locomotion directive, sent as an integer 0–4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SwimCommand {
    Forward = 0,
    TurnLeft = 1,
    TurnRight = 2,
    RiseUp = 3,
    Stay = 4,
}

impl SwimCommand {
    /// All swim commands in wire order.
    pub const ALL: [SwimCommand; 5] = [
        SwimCommand::Forward,
        SwimCommand::TurnLeft,
        SwimCommand::TurnRight,
        SwimCommand::RiseUp,
        SwimCommand::Stay,
    ];

    /// Returns the kebab-case name used on the command line and in logs.
    pub fn name(self) -> &'static str {
        match self {
            SwimCommand::Forward => "forward",
            SwimCommand::TurnLeft => "turn-left",
            SwimCommand::TurnRight => "turn-right",
            SwimCommand::RiseUp => "rise-up",
            SwimCommand::Stay => "stay",
        }
    }
}

impl TryFrom<u8> for SwimCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SwimCommand::ALL.get(value as usize).copied().ok_or(())
    }
}

impl fmt::Display for SwimCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SwimCommand {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SwimCommand::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError::new("swim command", s))
    }
}

/// Returned when a mode or swim-command name is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ── Swim parameters ───────────────────────────────────────────────────────────

/// Gait tuning values applied while the robot is in [`Mode::Swim`].
///
/// The protocol layer sends whatever it is given.  Range enforcement happens
/// at the UI boundary through [`SwimParameters::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwimParameters {
    /// Duration of one flapping cycle in seconds.
    pub period_sec: f32,
    /// Flap amplitude in degrees (0–90).
    pub wing_deg: f32,
    /// Joint limit in degrees (0–45).
    pub max_angle_deg: f32,
    /// Left/right balance (−1.0 = fully left, 1.0 = fully right).
    pub y_rate: f32,
    /// Run the gait in reverse.
    #[serde(default)]
    pub is_backward: bool,
}

impl SwimParameters {
    pub const PERIOD_RANGE: (f32, f32) = (0.5, 3.0);
    pub const WING_RANGE: (f32, f32) = (0.0, 90.0);
    pub const MAX_ANGLE_RANGE: (f32, f32) = (0.0, 45.0);
    pub const Y_RATE_RANGE: (f32, f32) = (-1.0, 1.0);

    pub fn new(period_sec: f32, wing_deg: f32, max_angle_deg: f32, y_rate: f32, is_backward: bool) -> Self {
        Self {
            period_sec,
            wing_deg,
            max_angle_deg,
            y_rate,
            is_backward,
        }
    }

    /// Returns a copy with every numeric field forced into its allowed range.
    ///
    /// NaN inputs collapse to the lower bound of their range.
    ///
    /// ```rust
    /// use swimbot_core::SwimParameters;
    ///
    /// let p = SwimParameters::new(10.0, 120.0, -5.0, 1.5, false).clamped();
    /// assert_eq!(p.period_sec, 3.0);
    /// assert_eq!(p.wing_deg, 90.0);
    /// assert_eq!(p.max_angle_deg, 0.0);
    /// assert_eq!(p.y_rate, 1.0);
    /// ```
    pub fn clamped(self) -> Self {
        Self {
            period_sec: clamp_to(self.period_sec, Self::PERIOD_RANGE),
            wing_deg: clamp_to(self.wing_deg, Self::WING_RANGE),
            max_angle_deg: clamp_to(self.max_angle_deg, Self::MAX_ANGLE_RANGE),
            y_rate: clamp_to(self.y_rate, Self::Y_RATE_RANGE),
            is_backward: self.is_backward,
        }
    }
}

impl Default for SwimParameters {
    fn default() -> Self {
        Self {
            period_sec: 1.0,
            wing_deg: 30.0,
            max_angle_deg: 20.0,
            y_rate: 0.0,
            is_backward: false,
        }
    }
}

fn clamp_to(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Bitmask carried in byte 3 of a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorFlags(pub u8);

impl ErrorFlags {
    pub const WIFI_DISCONNECTED: u8 = 0x01;
    pub const ANGLE_OUT_OF_RANGE: u8 = 0x02;

    pub fn wifi_disconnected(self) -> bool {
        self.0 & Self::WIFI_DISCONNECTED != 0
    }

    pub fn angle_out_of_range(self) -> bool {
        self.0 & Self::ANGLE_OUT_OF_RANGE != 0
    }
}

/// Snapshot decoded from one status response.
///
/// A fresh value is produced by every successful poll; nothing mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub mode: Mode,
    /// Current joint angle in degrees, tenths precision.
    pub current_angle_deg: f32,
    pub wifi_disconnected: bool,
    pub angle_out_of_range: bool,
}

impl RobotStatus {
    /// Reassembles the flag byte from the two boolean fields.
    pub fn error_flags(&self) -> ErrorFlags {
        let mut bits = 0u8;
        if self.wifi_disconnected {
            bits |= ErrorFlags::WIFI_DISCONNECTED;
        }
        if self.angle_out_of_range {
            bits |= ErrorFlags::ANGLE_OUT_OF_RANGE;
        }
        ErrorFlags(bits)
    }
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode={} angle={:.1}° wifi_disconnected={} angle_out_of_range={}",
            self.mode, self.current_angle_deg, self.wifi_disconnected, self.angle_out_of_range
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
