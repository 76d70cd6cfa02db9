//! In-memory transport fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::infrastructure::transport::{Transport, TransportError};

enum Step {
    Reply(Vec<u8>),
    Fail(TransportError),
    /// Never answers; the request runs into its timeout.
    Silent,
}

#[derive(Default)]
struct ProbeState {
    requests: Vec<Vec<u8>>,
    timeouts: Vec<Duration>,
    closes: usize,
}

/// Read-only view onto what a [`ScriptedTransport`] saw, usable after the
/// transport itself has been boxed and handed away.
#[derive(Clone, Default)]
pub(crate) struct SessionProbe(Arc<Mutex<ProbeState>>);

impl SessionProbe {
    pub(crate) fn requests(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().requests.clone()
    }

    pub(crate) fn timeouts(&self) -> Vec<Duration> {
        self.0.lock().unwrap().timeouts.clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

/// A [`Transport`] that replays a fixed script of outcomes.
///
/// Once the script runs out it answers with the `always` reply if one was
/// set, otherwise it stays silent.  Errors poison the session the same way
/// the TCP implementation does.
pub(crate) struct ScriptedTransport {
    script: VecDeque<Step>,
    always: Option<Vec<u8>>,
    open: bool,
    probe: SessionProbe,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            script: VecDeque::new(),
            always: None,
            open: true,
            probe: SessionProbe::default(),
        }
    }

    pub(crate) fn reply(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Step::Reply(bytes.to_vec()));
        self
    }

    pub(crate) fn fail(mut self, error: TransportError) -> Self {
        self.script.push_back(Step::Fail(error));
        self
    }

    pub(crate) fn silent(mut self) -> Self {
        self.script.push_back(Step::Silent);
        self
    }

    pub(crate) fn always(mut self, bytes: &[u8]) -> Self {
        self.always = Some(bytes.to_vec());
        self
    }

    pub(crate) fn probe(&self) -> SessionProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&mut self, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        {
            let mut state = self.probe.0.lock().unwrap();
            state.requests.push(message.to_vec());
            state.timeouts.push(timeout);
        }

        let step = match self.script.pop_front() {
            Some(step) => step,
            None => match &self.always {
                Some(bytes) => Step::Reply(bytes.clone()),
                None => Step::Silent,
            },
        };

        match step {
            Step::Reply(bytes) => Ok(bytes),
            Step::Fail(error) => {
                self.close().await;
                Err(error)
            }
            Step::Silent => {
                tokio::time::sleep(timeout).await;
                self.close().await;
                Err(TransportError::OperationTimeout(timeout))
            }
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.probe.0.lock().unwrap().closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Eight-byte status response for `mode` with a zero angle and no flags.
pub(crate) fn status_reply(mode: u8) -> [u8; 8] {
    [mode, 0, 0, 0, 0, 0, 0, 0]
}
