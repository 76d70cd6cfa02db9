//! A fake robot listening on a real TCP socket.
//!
//! It decodes each incoming command with the same codec the client uses and
//! answers according to a [`Behavior`], so integration tests exercise the
//! real `TcpSession` end to end.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use swimbot_client::DeviceAddress;
use swimbot_core::protocol::{decode_command, encode_status};
use swimbot_core::{Command, Mode, NakCode, RobotStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the fake device answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Accept everything and report the current mode.
    Normal,
    /// Reject every acknowledged command with this code.
    Nak(NakCode),
    /// Close the socket on the first request instead of answering.
    Reset,
    /// Read requests but never answer.
    Silent,
    /// Answer status queries with three bytes instead of eight.
    ShortStatus,
    /// Answer status queries only after this delay; reject everything else
    /// with [`NakCode::InvalidMode`].
    SlowStatus(Duration),
}

pub struct FakeDevice {
    pub address: DeviceAddress,
    received: Arc<Mutex<Vec<Command>>>,
    connections: Arc<Mutex<usize>>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let mode = Arc::new(Mutex::new(Mode::ServoOff));

        let task = tokio::spawn({
            let received = Arc::clone(&received);
            let connections = Arc::clone(&connections);
            async move {
                loop {
                    let Ok((sock, _)) = listener.accept().await else {
                        return;
                    };
                    *connections.lock().unwrap() += 1;
                    tokio::spawn(serve(
                        sock,
                        behavior,
                        Arc::clone(&received),
                        Arc::clone(&mode),
                    ));
                }
            }
        });

        Self {
            address: DeviceAddress::new("127.0.0.1", port),
            received,
            connections,
            task,
        }
    }

    /// Commands the device has decoded so far, in arrival order.
    pub fn received(&self) -> Vec<Command> {
        self.received.lock().unwrap().clone()
    }

    /// Number of TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut sock: TcpStream,
    behavior: Behavior,
    received: Arc<Mutex<Vec<Command>>>,
    mode: Arc<Mutex<Mode>>,
) {
    let mut buf = [0u8; 64];
    loop {
        let n = match sock.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        let command = match decode_command(&buf[..n]) {
            Ok((command, _)) => command,
            Err(_) => {
                let _ = sock.write_all(&[NakCode::UnknownCommand.to_byte()]).await;
                continue;
            }
        };
        received.lock().unwrap().push(command);

        let reply: Vec<u8> = match (behavior, command) {
            (Behavior::Reset, _) => return,
            (Behavior::Silent, _) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return;
            }
            (Behavior::ShortStatus, Command::QueryStatus) => vec![0x02, 0x00, 0x00],
            (Behavior::SlowStatus(delay), Command::QueryStatus) => {
                tokio::time::sleep(delay).await;
                vec![0x03, 0, 0, 0, 0, 0, 0, 0]
            }
            (Behavior::SlowStatus(_), _) => vec![NakCode::InvalidMode.to_byte()],
            (_, Command::QueryStatus) => {
                let status = RobotStatus {
                    mode: *mode.lock().unwrap(),
                    current_angle_deg: 12.5,
                    wifi_disconnected: false,
                    angle_out_of_range: false,
                };
                encode_status(&status).to_vec()
            }
            (Behavior::Nak(code), _) => vec![code.to_byte()],
            (_, Command::SetMode(new_mode)) => {
                *mode.lock().unwrap() = new_mode;
                vec![0x00]
            }
            (_, _) => vec![0x00],
        };

        if sock.write_all(&reply).await.is_err() {
            return;
        }
    }
}
