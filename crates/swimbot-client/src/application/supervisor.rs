//! ConnectionSupervisor: the connect / retry / manual-disconnect state machine.
//!
//! # States
//!
//! ```text
//!                  connect (manual or poll retry)
//!   Disconnected ──────────────────────────────▶ Connecting
//!        ▲  ▲                                      │    │
//!        │  └──── open failed (retries += 1) ──────┘    │ open ok (retries = 0)
//!        │                                              ▼
//!        └──────────── transport fault ─────────── Connected
//!
//!   any state ── disconnect ──▶ ManuallyDisconnected ── connect ──▶ Connecting
//! ```
//!
//! Once `max_retries` consecutive opens have failed, the supervisor is
//! *exhausted*: poll ticks no longer attempt to reconnect and only an explicit
//! [`ConnectionSupervisor::connect`] call re-arms it.
//!
//! The retry counter is reset only by a successful open.  A fault that drops
//! an established connection leaves it untouched, so a link that keeps
//! flapping still runs out of retries.

use std::time::Duration;

use serde::Serialize;
use swimbot_core::{Ack, Mode, RobotStatus, SwimCommand, SwimParameters};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::protocol_client::{ClientError, ProtocolClient};
use crate::infrastructure::transport::{Connector, DeviceAddress};

/// Capacity of the event broadcast channel.  Slow subscribers lag, they
/// never block the supervisor.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The caller disconnected on purpose; automatic reconnects are off.
    ManuallyDisconnected,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ManuallyDisconnected => "manually-disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounded count of consecutive failed connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    count: u32,
    max: u32,
}

impl RetryCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Records one failed attempt and returns the new count.  Never exceeds `max`.
    pub fn record_failure(&mut self) -> u32 {
        if self.count < self.max {
            self.count += 1;
        }
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= self.max
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DisconnectReason {
    Manual,
    TransportFault(String),
}

/// Notifications published to subscribers (UI, CLI monitor).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Connecting {
        address: String,
        attempt: u32,
    },
    Connected {
        address: String,
    },
    ConnectFailed {
        attempt: u32,
        max_retries: u32,
        reason: String,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    /// Terminal: no further automatic reconnects until `connect` is called.
    RetryExhausted {
        attempts: u32,
    },
    StatusUpdated {
        status: RobotStatus,
    },
    /// Raised on every malformed status response once the streak reaches
    /// the configured threshold.
    MalformedResponses {
        consecutive: u32,
    },
}

/// Timeouts and limits the supervisor runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub malformed_threshold: u32,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            max_retries: 3,
            malformed_threshold: 3,
        }
    }
}

/// Owns the [`ProtocolClient`] and every piece of connection state.
///
/// All methods take `&mut self`; the service worker is the only owner, which
/// is what keeps requests strictly one at a time.
pub struct ConnectionSupervisor {
    connector: Box<dyn Connector>,
    address: DeviceAddress,
    policy: SupervisorPolicy,
    client: ProtocolClient,
    state: ConnectionState,
    retries: RetryCounter,
    exhausted: bool,
    malformed_streak: u32,
    events: broadcast::Sender<SupervisorEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new(connector: Box<dyn Connector>, address: DeviceAddress, policy: SupervisorPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            address,
            policy,
            client: ProtocolClient::new(policy.operation_timeout),
            state: ConnectionState::Disconnected,
            retries: RetryCounter::new(policy.max_retries),
            exhausted: false,
            malformed_streak: 0,
            events,
            state_tx,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retries(&self) -> RetryCounter {
        self.retries
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<SupervisorEvent> {
        self.events.clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Caller-initiated connect.
    ///
    /// Clears the manual-disconnect flag and, if retries were exhausted,
    /// re-arms the counter.  Returns `true` once connected; a call while
    /// already connected is a no-op that returns `true`.
    pub async fn connect(&mut self) -> bool {
        if self.state == ConnectionState::Connected && self.client.is_connected() {
            return true;
        }
        if self.exhausted {
            info!("re-arming retries after explicit connect");
        }
        self.exhausted = false;
        self.retries.reset();
        self.attempt_connect().await
    }

    /// One connect attempt.  Retry bookkeeping happens here; the caller
    /// decides whether an attempt is allowed at all.
    async fn attempt_connect(&mut self) -> bool {
        let attempt = self.retries.count() + 1;
        self.set_state(ConnectionState::Connecting);
        self.emit(SupervisorEvent::Connecting {
            address: self.address.to_string(),
            attempt,
        });
        debug!("connecting to {} (attempt {attempt}/{})", self.address, self.retries.max());

        match self.connector.open(&self.address, self.policy.connect_timeout).await {
            Ok(session) => {
                self.client.attach(session).await;
                self.retries.reset();
                self.malformed_streak = 0;
                self.set_state(ConnectionState::Connected);
                info!("connected to {}", self.address);
                self.emit(SupervisorEvent::Connected {
                    address: self.address.to_string(),
                });
                true
            }
            Err(e) => {
                let count = self.retries.record_failure();
                self.set_state(ConnectionState::Disconnected);
                warn!("connect to {} failed ({count}/{}): {e}", self.address, self.retries.max());
                self.emit(SupervisorEvent::ConnectFailed {
                    attempt: count,
                    max_retries: self.retries.max(),
                    reason: e.to_string(),
                });
                if self.retries.is_exhausted() {
                    self.exhausted = true;
                    error!(
                        "giving up on {} after {count} failed attempt(s); reconnect manually",
                        self.address
                    );
                    self.emit(SupervisorEvent::RetryExhausted { attempts: count });
                }
                false
            }
        }
    }

    /// Caller-initiated disconnect.  Closes the session and suppresses
    /// automatic reconnects until [`connect`](Self::connect) is called.
    pub async fn disconnect(&mut self) {
        self.client.invalidate().await;
        if self.state == ConnectionState::ManuallyDisconnected {
            return;
        }
        self.set_state(ConnectionState::ManuallyDisconnected);
        info!("disconnected from {} by request", self.address);
        self.emit(SupervisorEvent::Disconnected {
            reason: DisconnectReason::Manual,
        });
    }

    /// Called when an operation future was dropped before it finished.
    ///
    /// The dropped request may still be answered on the wire, so the session
    /// is discarded rather than reused; otherwise the next request would read
    /// the stale reply as its own.
    pub async fn abort_in_flight(&mut self) {
        debug!("operation on {} aborted; discarding the session", self.address);
        self.disconnect().await;
    }

    /// One health-check tick.
    ///
    /// Connected: fetch status.  Disconnected and not exhausted: try to
    /// reconnect.  Anything else: nothing.
    pub async fn poll(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                self.query_status().await;
            }
            ConnectionState::Disconnected if !self.exhausted => {
                self.attempt_connect().await;
            }
            _ => {}
        }
    }

    // ── Robot operations ─────────────────────────────────────────────────────

    pub async fn set_mode(&mut self, mode: Mode) -> bool {
        let result = self.client.set_mode(mode).await;
        self.settle_ack("set_mode", result)
    }

    pub async fn send_swim_command(&mut self, command: SwimCommand) -> bool {
        let result = self.client.send_swim_command(command).await;
        self.settle_ack("swim_command", result)
    }

    pub async fn send_parameters(&mut self, params: SwimParameters) -> bool {
        let result = self.client.send_parameters(params).await;
        self.settle_ack("send_parameters", result)
    }

    /// Fetches a status snapshot.  Publishes [`SupervisorEvent::StatusUpdated`]
    /// on success.
    pub async fn query_status(&mut self) -> Option<RobotStatus> {
        match self.client.query_status().await {
            Ok(status) => {
                self.malformed_streak = 0;
                self.emit(SupervisorEvent::StatusUpdated { status });
                Some(status)
            }
            Err(ClientError::MalformedResponse { operation, source }) => {
                self.malformed_streak += 1;
                warn!(
                    "malformed {operation} response ({} in a row): {source}",
                    self.malformed_streak
                );
                if self.malformed_streak >= self.policy.malformed_threshold {
                    self.emit(SupervisorEvent::MalformedResponses {
                        consecutive: self.malformed_streak,
                    });
                }
                None
            }
            Err(e) => {
                self.on_failure("query_status", e);
                None
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn settle_ack(&mut self, operation: &str, result: Result<Ack, ClientError>) -> bool {
        match result {
            Ok(Ack::Accepted) => true,
            Ok(Ack::Rejected(code)) => {
                warn!("{operation} rejected by device: {code:?}");
                false
            }
            Err(e) => {
                self.on_failure(operation, e);
                false
            }
        }
    }

    fn on_failure(&mut self, operation: &str, err: ClientError) {
        match err {
            ClientError::Transport(e) => {
                if self.state == ConnectionState::Connected {
                    self.set_state(ConnectionState::Disconnected);
                    warn!("{operation} lost the connection to {}: {e}", self.address);
                    self.emit(SupervisorEvent::Disconnected {
                        reason: DisconnectReason::TransportFault(e.to_string()),
                    });
                }
            }
            ClientError::NotConnected => {
                debug!("{operation} skipped: not connected ({})", self.state);
            }
            ClientError::MalformedResponse { source, .. } => {
                warn!("malformed {operation} response: {source}");
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("state {} → {}", self.state, state);
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: SupervisorEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::infrastructure::transport::{MockConnector, Transport, TransportError};
    use crate::testing::{status_reply, ScriptedTransport};
    use swimbot_core::NakCode;

    fn address() -> DeviceAddress {
        DeviceAddress::new("10.1.100.158", 8000)
    }

    fn refused() -> TransportError {
        TransportError::ConnectRefused {
            address: address().to_string(),
        }
    }

    /// A connector that hands out the given outcomes in order, exactly once each.
    fn scripted_connector(outcomes: Vec<Result<ScriptedTransport, TransportError>>) -> MockConnector {
        let mut outcomes: VecDeque<_> = outcomes.into();
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .times(outcomes.len())
            .returning(move |_, _| match outcomes.pop_front() {
                Some(Ok(t)) => Ok(Box::new(t) as Box<dyn Transport>),
                Some(Err(e)) => Err(e),
                None => unreachable!("times() bounds the calls"),
            });
        connector
    }

    fn supervisor(connector: MockConnector) -> ConnectionSupervisor {
        ConnectionSupervisor::new(Box::new(connector), address(), SupervisorPolicy::default())
    }

    fn drain(rx: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // ── RetryCounter ─────────────────────────────────────────────────────────

    #[test]
    fn test_retry_counter_saturates_at_max() {
        let mut counter = RetryCounter::new(3);
        assert_eq!(counter.record_failure(), 1);
        assert_eq!(counter.record_failure(), 2);
        assert!(!counter.is_exhausted());
        assert_eq!(counter.record_failure(), 3);
        assert!(counter.is_exhausted());
        assert_eq!(counter.record_failure(), 3);

        counter.reset();
        assert_eq!(counter.count(), 0);
        assert!(!counter.is_exhausted());
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_connect_success_reaches_connected() {
        // Arrange
        let mut sup = supervisor(scripted_connector(vec![Ok(ScriptedTransport::new())]));
        let mut rx = sup.subscribe();
        let state_rx = sup.watch_state();

        // Act
        let connected = sup.connect().await;

        // Assert
        assert!(connected);
        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
        assert_eq!(
            drain(&mut rx),
            vec![
                SupervisorEvent::Connecting {
                    address: "10.1.100.158:8000".into(),
                    attempt: 1
                },
                SupervisorEvent::Connected {
                    address: "10.1.100.158:8000".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_three_failed_connects_exhaust_and_stop_retrying() {
        // Arrange: times(3) makes a fourth open a test failure
        let mut connector = MockConnector::new();
        connector.expect_open().times(3).returning(|_, _| Err(refused()));
        let mut sup = supervisor(connector);
        let mut rx = sup.subscribe();

        // Act: one manual attempt, then poll ticks drive the retries
        assert!(!sup.connect().await);
        sup.poll().await;
        sup.poll().await;
        sup.poll().await;
        sup.poll().await;

        // Assert
        assert!(sup.is_exhausted());
        assert_eq!(sup.retries().count(), 3);
        assert_eq!(sup.state(), ConnectionState::Disconnected);
        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&SupervisorEvent::RetryExhausted { attempts: 3 })
        );
        let failures = events
            .iter()
            .filter(|e| matches!(e, SupervisorEvent::ConnectFailed { .. }))
            .count();
        assert_eq!(failures, 3);
    }

    #[tokio::test]
    async fn test_manual_disconnect_suppresses_poll_reconnect() {
        // Arrange
        let mut sup = supervisor(scripted_connector(vec![
            Ok(ScriptedTransport::new()),
            Ok(ScriptedTransport::new()),
        ]));
        assert!(sup.connect().await);

        // Act
        sup.disconnect().await;
        sup.poll().await;
        sup.poll().await;

        // Assert: still down, and only an explicit connect brings it back
        assert_eq!(sup.state(), ConnectionState::ManuallyDisconnected);
        assert!(sup.connect().await);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_closes_session() {
        let transport = ScriptedTransport::new();
        let probe = transport.probe();
        let mut sup = supervisor(scripted_connector(vec![Ok(transport)]));
        let mut rx = sup.subscribe();
        sup.connect().await;

        sup.disconnect().await;

        assert_eq!(probe.close_count(), 1);
        assert!(drain(&mut rx).contains(&SupervisorEvent::Disconnected {
            reason: DisconnectReason::Manual
        }));
    }

    #[tokio::test]
    async fn test_mid_operation_reset_drops_to_disconnected_and_discards_session() {
        // Arrange
        let broken = ScriptedTransport::new().fail(TransportError::ConnectionReset);
        let probe = broken.probe();
        let fresh = ScriptedTransport::new().always(&status_reply(2));
        let mut sup = supervisor(scripted_connector(vec![Ok(broken), Ok(fresh)]));
        sup.connect().await;
        let mut rx = sup.subscribe();

        // Act
        let accepted = sup.set_mode(Mode::Swim).await;

        // Assert
        assert!(!accepted);
        assert_eq!(sup.state(), ConnectionState::Disconnected);
        assert_eq!(sup.retries().count(), 0);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [SupervisorEvent::Disconnected {
                reason: DisconnectReason::TransportFault(_)
            }]
        ));

        // The old session never sees another request.
        assert_eq!(sup.query_status().await, None);
        assert_eq!(probe.requests().len(), 1);

        // The next poll tick opens a fresh session.
        sup.poll().await;
        assert_eq!(sup.state(), ConnectionState::Connected);
        let status = sup.query_status().await.unwrap();
        assert_eq!(status.mode, Mode::Stay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out_into_disconnected() {
        let transport = ScriptedTransport::new().silent();
        let probe = transport.probe();
        let mut sup = supervisor(scripted_connector(vec![Ok(transport)]));
        sup.connect().await;

        sup.poll().await;

        assert_eq!(sup.state(), ConnectionState::Disconnected);
        assert_eq!(probe.timeouts(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_nak_returns_false_and_keeps_connection() {
        let transport = ScriptedTransport::new().reply(&[NakCode::InvalidMode.to_byte()]);
        let mut sup = supervisor(scripted_connector(vec![Ok(transport)]));
        sup.connect().await;

        assert!(!sup.set_mode(Mode::Raise).await);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_rejected_acks_are_false_for_every_command_and_keep_connection() {
        let transport = ScriptedTransport::new()
            .reply(&[0x80])
            .reply(&[0x80])
            .reply(&[0x80])
            .reply(&[0x00])
            .reply(&[0x00])
            .reply(&[0x00]);
        let mut sup = supervisor(scripted_connector(vec![Ok(transport)]));
        sup.connect().await;

        assert!(!sup.set_mode(Mode::Swim).await);
        assert!(!sup.send_swim_command(SwimCommand::TurnRight).await);
        assert!(!sup.send_parameters(SwimParameters::default()).await);
        assert_eq!(sup.state(), ConnectionState::Connected);

        assert!(sup.set_mode(Mode::Swim).await);
        assert!(sup.send_swim_command(SwimCommand::TurnRight).await);
        assert!(sup.send_parameters(SwimParameters::default()).await);
        assert_eq!(sup.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_abort_in_flight_discards_session_and_holds_disconnected() {
        let transport = ScriptedTransport::new().always(&[0x00]);
        let probe = transport.probe();
        let mut sup = supervisor(scripted_connector(vec![Ok(transport)]));
        sup.connect().await;

        sup.abort_in_flight().await;

        assert_eq!(probe.close_count(), 1);
        assert_eq!(sup.state(), ConnectionState::ManuallyDisconnected);
        assert!(!sup.set_mode(Mode::Stay).await);
        assert!(probe.requests().is_empty());
    }

    #[tokio::test]
    async fn test_commands_while_disconnected_fail_without_state_change() {
        let mut sup = supervisor(MockConnector::new());

        assert!(!sup.send_swim_command(SwimCommand::Forward).await);
        assert!(!sup.send_parameters(SwimParameters::default()).await);
        assert_eq!(sup.query_status().await, None);
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_malformed_streak_is_reported_at_threshold_and_keeps_connection() {
        // Arrange
        let transport = ScriptedTransport::new()
            .reply(&[0x02])
            .reply(&[0x02])
            .reply(&[0x09, 0, 0, 0, 0, 0, 0, 0])
            .reply(&status_reply(3))
            .reply(&[0x02]);
        let mut sup = supervisor(scripted_connector(vec![Ok(transport)]));
        sup.connect().await;
        let mut rx = sup.subscribe();

        // Act
        for _ in 0..5 {
            sup.poll().await;
        }

        // Assert
        assert_eq!(sup.state(), ConnectionState::Connected);
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                SupervisorEvent::MalformedResponses { consecutive: 3 },
                SupervisorEvent::StatusUpdated {
                    status: RobotStatus {
                        mode: Mode::Swim,
                        current_angle_deg: 0.0,
                        wifi_disconnected: false,
                        angle_out_of_range: false,
                    }
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_explicit_connect_rearms_after_exhaustion() {
        // Arrange
        let mut sup = supervisor(scripted_connector(vec![
            Err(refused()),
            Err(refused()),
            Err(refused()),
            Ok(ScriptedTransport::new()),
        ]));
        sup.connect().await;
        sup.poll().await;
        sup.poll().await;
        assert!(sup.is_exhausted());

        // Act
        let connected = sup.connect().await;

        // Assert
        assert!(connected);
        assert!(!sup.is_exhausted());
        assert_eq!(sup.retries().count(), 0);
    }

    #[tokio::test]
    async fn test_successful_poll_reconnect_resets_retry_count() {
        let mut sup = supervisor(scripted_connector(vec![
            Err(refused()),
            Err(refused()),
            Ok(ScriptedTransport::new()),
        ]));

        sup.connect().await;
        sup.poll().await;
        assert_eq!(sup.retries().count(), 2);
        sup.poll().await;

        assert_eq!(sup.state(), ConnectionState::Connected);
        assert_eq!(sup.retries().count(), 0);
    }
}
