//! RobotService: the worker task that owns the supervisor.
//!
//! Callers never touch the socket.  They hold a cloneable [`RobotHandle`]
//! that queues a [`Request`] and awaits the reply on a oneshot channel.  The
//! worker drains the queue one request at a time and runs the status poll in
//! the gaps, so a poll can never race a command.
//!
//! ```text
//!   RobotHandle ──mpsc──▶ RobotService ──▶ ConnectionSupervisor ──▶ ProtocolClient
//!        ▲                     │
//!        └──── oneshot ────────┘        events: broadcast, state: watch
//! ```
//!
//! # Aborting
//!
//! `disconnect` and `shutdown` first signal a shared [`Notify`].  Every
//! operation the worker runs is raced against it; when it fires, the
//! operation future is dropped (its pending read goes with it) and the
//! session is discarded on the spot, before any request queued behind it
//! runs.  The queued disconnect then finds the supervisor already down.

use std::future::Future;
use std::sync::Arc;

use swimbot_core::{Mode, RobotStatus, SwimCommand, SwimParameters};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use super::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorEvent};

const REQUEST_QUEUE_CAPACITY: usize = 32;

/// A unit of work for the worker, carrying its reply channel.
#[derive(Debug)]
pub enum Request {
    Connect(oneshot::Sender<bool>),
    Disconnect(oneshot::Sender<()>),
    SetMode(Mode, oneshot::Sender<bool>),
    SwimCommand(SwimCommand, oneshot::Sender<bool>),
    SendParameters(SwimParameters, oneshot::Sender<bool>),
    QueryStatus(oneshot::Sender<Option<RobotStatus>>),
    Shutdown,
}

/// Races `fut` against `abort`.  Returns `None` if the abort won.
async fn guarded<F: Future>(abort: &Notify, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = abort.notified() => None,
        out = fut => Some(out),
    }
}

/// Owns the [`ConnectionSupervisor`] and serialises all access to it.
pub struct RobotService {
    supervisor: ConnectionSupervisor,
    requests: mpsc::Receiver<Request>,
    abort: Arc<Notify>,
}

impl RobotService {
    /// Wraps `supervisor` and returns the service together with its first handle.
    pub fn new(supervisor: ConnectionSupervisor) -> (Self, RobotHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let abort = Arc::new(Notify::new());
        let handle = RobotHandle {
            requests: tx,
            abort: Arc::clone(&abort),
            events: supervisor.event_sender(),
            state: supervisor.watch_state(),
        };
        let service = Self {
            supervisor,
            requests: rx,
            abort,
        };
        (service, handle)
    }

    /// Runs until [`RobotHandle::shutdown`] is called or every handle is dropped.
    ///
    /// The next poll is scheduled one interval after the previous poll
    /// finished, never while a request is in flight.
    pub async fn run(mut self) {
        let interval = self.supervisor.policy().poll_interval;
        let mut next_poll = Instant::now() + interval;
        info!(
            "robot service started for {} (poll every {:?})",
            self.supervisor.address(),
            interval
        );

        loop {
            tokio::select! {
                biased;
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        debug!("all robot handles dropped");
                        break;
                    };
                    if !self.handle(request).await {
                        break;
                    }
                }
                _ = time::sleep_until(next_poll) => {
                    if guarded(&self.abort, self.supervisor.poll()).await.is_none() {
                        self.supervisor.abort_in_flight().await;
                    }
                    next_poll = Instant::now() + interval;
                }
            }
        }

        self.supervisor.disconnect().await;
        info!("robot service stopped");
    }

    /// Executes one request.  Returns `false` when the worker should stop.
    async fn handle(&mut self, request: Request) -> bool {
        match request {
            Request::Connect(reply) => {
                let ok = guarded(&self.abort, self.supervisor.connect()).await;
                let ok = self.settle(ok).await;
                let _ = reply.send(ok.unwrap_or(false));
            }
            Request::Disconnect(reply) => {
                self.supervisor.disconnect().await;
                let _ = reply.send(());
            }
            Request::SetMode(mode, reply) => {
                let ok = guarded(&self.abort, self.supervisor.set_mode(mode)).await;
                let ok = self.settle(ok).await;
                let _ = reply.send(ok.unwrap_or(false));
            }
            Request::SwimCommand(command, reply) => {
                let ok = guarded(&self.abort, self.supervisor.send_swim_command(command)).await;
                let ok = self.settle(ok).await;
                let _ = reply.send(ok.unwrap_or(false));
            }
            Request::SendParameters(params, reply) => {
                let ok = guarded(&self.abort, self.supervisor.send_parameters(params)).await;
                let ok = self.settle(ok).await;
                let _ = reply.send(ok.unwrap_or(false));
            }
            Request::QueryStatus(reply) => {
                let status = guarded(&self.abort, self.supervisor.query_status()).await;
                let status = self.settle(status).await;
                let _ = reply.send(status.flatten());
            }
            Request::Shutdown => return false,
        }
        true
    }

    /// Drops the session when `outcome` is an aborted operation, so requests
    /// queued behind it cannot read its late reply.
    async fn settle<T>(&mut self, outcome: Option<T>) -> Option<T> {
        if outcome.is_none() {
            self.supervisor.abort_in_flight().await;
        }
        outcome
    }
}

/// Spawns a [`RobotService`] for `supervisor` on the current runtime.
pub fn spawn(supervisor: ConnectionSupervisor) -> (RobotHandle, JoinHandle<()>) {
    let (service, handle) = RobotService::new(supervisor);
    let task = tokio::spawn(service.run());
    (handle, task)
}

/// Cloneable front door to a running [`RobotService`].
///
/// Every method resolves to a failure value (`false` / `None`) once the
/// service has stopped, instead of erroring.
#[derive(Clone)]
pub struct RobotHandle {
    requests: mpsc::Sender<Request>,
    abort: Arc<Notify>,
    events: broadcast::Sender<SupervisorEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl RobotHandle {
    pub async fn connect(&self) -> bool {
        self.call(Request::Connect).await.unwrap_or(false)
    }

    /// Aborts whatever the worker is doing, then closes the connection and
    /// disables automatic reconnects.
    pub async fn disconnect(&self) {
        self.abort.notify_waiters();
        self.call(Request::Disconnect).await;
    }

    pub async fn set_mode(&self, mode: Mode) -> bool {
        self.call(|tx| Request::SetMode(mode, tx)).await.unwrap_or(false)
    }

    pub async fn send_swim_command(&self, command: SwimCommand) -> bool {
        self.call(|tx| Request::SwimCommand(command, tx))
            .await
            .unwrap_or(false)
    }

    pub async fn send_parameters(&self, params: SwimParameters) -> bool {
        self.call(|tx| Request::SendParameters(params, tx))
            .await
            .unwrap_or(false)
    }

    pub async fn query_status(&self) -> Option<RobotStatus> {
        self.call(Request::QueryStatus).await.flatten()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stops the worker.  The session is closed on the way out.
    pub async fn shutdown(&self) {
        self.abort.notify_waiters();
        let _ = self.requests.send(Request::Shutdown).await;
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.requests.send(make(tx)).await.ok()?;
        rx.await.ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
