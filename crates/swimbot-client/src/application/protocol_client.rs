//! ProtocolClient: typed robot operations over one transport session.
//!
//! The client pairs every encoded [`Command`] with exactly one response from
//! the session and decodes it.  It performs no retries.  A transport failure
//! means the byte stream can no longer be trusted (there is no framing to
//! resynchronise on), so the client closes and drops the session before
//! reporting the error.  Only a brand-new session from the supervisor brings
//! it back.

use std::time::Duration;

use swimbot_core::{
    decode_ack, decode_status, encode_command, Ack, Command, Mode, ProtocolError, RobotStatus,
    SwimCommand, SwimParameters,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::infrastructure::transport::{Transport, TransportError};

/// Errors returned by [`ProtocolClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No session is attached (never connected, or dropped after a fault).
    #[error("not connected to the robot")]
    NotConnected,

    /// The session failed; it has already been closed and discarded.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device answered, but the bytes did not match the expected layout.
    /// The session is kept.
    #[error("malformed response to {operation}: {source}")]
    MalformedResponse {
        operation: &'static str,
        #[source]
        source: ProtocolError,
    },
}

impl ClientError {
    /// Returns `true` for errors that cost the client its session.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::NotConnected)
    }
}

/// Robot operations bound to at most one live session.
pub struct ProtocolClient {
    session: Option<Box<dyn Transport>>,
    operation_timeout: Duration,
}

impl ProtocolClient {
    /// Creates a client with no session attached.
    pub fn new(operation_timeout: Duration) -> Self {
        Self {
            session: None,
            operation_timeout,
        }
    }

    /// Installs a freshly opened session, closing any previous one first.
    pub async fn attach(&mut self, session: Box<dyn Transport>) {
        self.invalidate().await;
        self.session = Some(session);
    }

    /// Closes and drops the current session, if any.
    pub async fn invalidate(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_open())
    }

    /// Switches the robot's operating mode.
    pub async fn set_mode(&mut self, mode: Mode) -> Result<Ack, ClientError> {
        self.acknowledged(Command::SetMode(mode)).await
    }

    /// Sends a locomotion directive.
    pub async fn send_swim_command(&mut self, command: SwimCommand) -> Result<Ack, ClientError> {
        self.acknowledged(Command::SwimCommand(command)).await
    }

    /// Uploads gait parameters exactly as given; no range checks are applied.
    pub async fn send_parameters(&mut self, params: SwimParameters) -> Result<Ack, ClientError> {
        self.acknowledged(Command::SendParameters(params)).await
    }

    /// Reads one status snapshot from the robot.
    pub async fn query_status(&mut self) -> Result<RobotStatus, ClientError> {
        let command = Command::QueryStatus;
        let response = self.exchange(&command).await?;
        decode_status(&response).map_err(|source| ClientError::MalformedResponse {
            operation: command.name(),
            source,
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn acknowledged(&mut self, command: Command) -> Result<Ack, ClientError> {
        let response = self.exchange(&command).await?;
        decode_ack(&response).map_err(|source| ClientError::MalformedResponse {
            operation: command.name(),
            source,
        })
    }

    /// One write followed by one read.  Invalidates the session on failure.
    async fn exchange(&mut self, command: &Command) -> Result<Vec<u8>, ClientError> {
        let session = self.session.as_mut().ok_or(ClientError::NotConnected)?;
        let message = encode_command(command);

        match session.request(&message, self.operation_timeout).await {
            Ok(response) => {
                debug!("{} → {:02X?}", command.name(), response);
                Ok(response)
            }
            Err(e) => {
                warn!("{} failed: {e}; dropping session", command.name());
                self.invalidate().await;
                Err(ClientError::Transport(e))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
