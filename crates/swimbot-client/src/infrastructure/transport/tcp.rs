//! TCP implementation of the transport seams.
//!
//! Uses only `tokio::net::TcpStream`, so it behaves the same on Windows,
//! Linux, and macOS.
//!
//! # One write, one read
//!
//! The robot protocol has no length prefixes.  Each request is answered by a
//! single response that fits in one small TCP segment, so [`TcpSession`]
//! performs exactly one `read` after each `write_all` and never buffers bytes
//! across calls.  Anything the device sends that does not fit the expected
//! layout is caught by the codec, not here.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, trace};

use super::{Connector, DeviceAddress, Transport, TransportError};

/// Upper bound on a single response read.
const MAX_RESPONSE_SIZE: usize = 1024;

/// A live TCP session to the robot.
pub struct TcpSession {
    /// `None` once the session has been closed or poisoned by an error.
    stream: Option<TcpStream>,
    peer: String,
}

impl TcpSession {
    /// Opens a session to `address`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectTimeout`] if the handshake does not finish in time.
    /// - [`TransportError::ConnectRefused`] if nothing listens on the port.
    /// - [`TransportError::Io`] for resolution failures and everything else.
    pub async fn open(address: &DeviceAddress, timeout: Duration) -> Result<Self, TransportError> {
        let peer = address.to_string();
        let connect = TcpStream::connect((address.host.as_str(), address.port));

        let stream = match time::timeout(timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                return Err(TransportError::ConnectRefused { address: peer });
            }
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_elapsed) => {
                return Err(TransportError::ConnectTimeout {
                    address: peer,
                    timeout,
                });
            }
        };

        // Commands are one to eleven bytes; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY on {peer}: {e}");
        }

        debug!("TCP session to {peer} established");
        Ok(Self {
            stream: Some(stream),
            peer,
        })
    }
}

#[async_trait]
impl Transport for TcpSession {
    async fn request(&mut self, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::Closed);
        };

        let exchange = async {
            stream.write_all(message).await?;
            let mut buf = vec![0u8; MAX_RESPONSE_SIZE];
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                // `read()` returned 0 bytes → the device closed the connection (EOF).
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            buf.truncate(n);
            Ok::<_, io::Error>(buf)
        };

        let failure = match time::timeout(timeout, exchange).await {
            Ok(Ok(response)) => {
                trace!("{}: {} byte(s) out, {} byte(s) in", self.peer, message.len(), response.len());
                return Ok(response);
            }
            Ok(Err(e)) => TransportError::from_exchange(e),
            Err(_elapsed) => TransportError::OperationTimeout(timeout),
        };

        // A failed exchange leaves the byte stream in an unknown position.
        self.close().await;
        Err(failure)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("shutdown of {} reported: {e}", self.peer);
            }
            debug!("TCP session to {} closed", self.peer);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// [`Connector`] that opens real [`TcpSession`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let session = TcpSession::open(address, timeout).await?;
        Ok(Box::new(session))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    async fn listener() -> (TcpListener, DeviceAddress) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, DeviceAddress::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_request_writes_message_and_returns_single_response() {
        // Arrange: a peer that answers every byte with 0x00
        let (listener, addr) = listener().await;
        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(&[0x00]).await.unwrap();
            buf[..n].to_vec()
        });
        let mut session = assert_ok!(TcpSession::open(&addr, Duration::from_secs(1)).await);

        // Act
        let response = session.request(&[0x13], Duration::from_secs(1)).await;

        // Assert
        assert_eq!(assert_ok!(response), vec![0x00]);
        assert_eq!(peer.await.unwrap(), vec![0x13]);
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_open_refused_when_nothing_listens() {
        let (listener, addr) = listener().await;
        drop(listener);

        let result = TcpSession::open(&addr, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TransportError::ConnectRefused { .. })));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out_and_poisons_session() {
        // Arrange: accept, then never answer
        let (listener, addr) = listener().await;
        let _peer = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(sock);
        });
        let mut session = TcpSession::open(&addr, Duration::from_secs(1)).await.unwrap();

        // Act
        let result = session.request(&[0xF0], Duration::from_millis(100)).await;

        // Assert
        assert!(matches!(result, Err(TransportError::OperationTimeout(_))));
        assert!(!session.is_open());
        let again = session.request(&[0xF0], Duration::from_millis(100)).await;
        assert!(matches!(again, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_peer_close_is_reported_as_reset() {
        let (listener, addr) = listener().await;
        let _peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            let _ = sock.read(&mut buf).await;
            // drop without answering
        });
        let mut session = TcpSession::open(&addr, Duration::from_secs(1)).await.unwrap();

        let result = session.request(&[0x50], Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TransportError::ConnectionReset)));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (listener, addr) = listener().await;
        let _peer = tokio::spawn(async move { listener.accept().await });
        let mut session = TcpSession::open(&addr, Duration::from_secs(1)).await.unwrap();

        session.close().await;
        session.close().await;

        assert!(!session.is_open());
        assert_err!(session.request(&[0xF0], Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_connector_returns_open_boxed_session() {
        let (listener, addr) = listener().await;
        let _peer = tokio::spawn(async move { listener.accept().await });

        let session = TcpConnector.open(&addr, Duration::from_secs(1)).await.unwrap();

        assert!(session.is_open());
    }
}
