use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use sipline_sip_core::{message_length, SipMessage, MAX_BODY_LENGTH};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportKind};

const DEFAULT_CHANNEL_CAPACITY: usize = 100;

// Room for one message with the largest body plus its header section
const MAX_BUFFERED_BYTES: usize = MAX_BODY_LENGTH + 64 * 1024;

/// TCP transport connected to a single peer
///
/// Each instance owns one stream; the read half runs in a background task that
/// frames messages with `Content-Length` and reports them as events.
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpTransportInner>,
}

struct TcpTransportInner {
    writer: Mutex<OwnedWriteHalf>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    closed: AtomicBool,
    reader: parking_lot::Mutex<Option<AbortHandle>>,
}

impl TcpTransport {
    /// Connects to `addr` and starts reading
    pub async fn connect(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        info!("SIP TCP transport connected to {}", addr);
        Self::from_stream(stream, channel_capacity)
    }

    /// Waits for one inbound connection on `listener`
    pub async fn accept(
        listener: &TcpListener,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (stream, peer) = listener.accept().await?;
        info!("SIP TCP transport accepted connection from {}", peer);
        Self::from_stream(stream, channel_capacity)
    }

    /// Wraps an established stream
    pub fn from_stream(
        stream: TcpStream,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (events_tx, events_rx) = mpsc::channel(channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY));
        let (read_half, write_half) = stream.into_split();

        let transport = TcpTransport {
            inner: Arc::new(TcpTransportInner {
                writer: Mutex::new(write_half),
                local_addr,
                remote_addr,
                closed: AtomicBool::new(false),
                reader: parking_lot::Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(read_loop(read_half, local_addr, remote_addr, events_tx));
        *transport.inner.reader.lock() = Some(handle.abort_handle());

        Ok((transport, events_rx))
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    events_tx: mpsc::Sender<TransportEvent>,
) {
    let mut buffer = BytesMut::with_capacity(4096);

    'read: loop {
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                debug!("TCP peer {} closed the connection", remote_addr);
                break;
            }
            Ok(n) => debug!("Read {} bytes from {}", n, remote_addr),
            Err(e) => {
                warn!("Error reading from {}: {}", remote_addr, e);
                break;
            }
        }

        loop {
            // Keepalive CRLFs between messages
            while buffer.first().is_some_and(|b| *b == b'\r' || *b == b'\n') {
                buffer.advance(1);
            }

            // Once framing is lost nothing after it can be trusted, so the
            // stream is given up
            let len = match message_length(&buffer) {
                Ok(Some(len)) => len,
                Ok(None) => break,
                Err(e) => {
                    warn!("Unframeable data from {}: {}", remote_addr, e);
                    let _ = events_tx
                        .send(TransportEvent::Error {
                            error: format!("Error framing SIP message: {}", e),
                        })
                        .await;
                    break 'read;
                }
            };

            let frame = buffer.split_to(len);
            let event = match SipMessage::parse(&frame) {
                Ok(message) => TransportEvent::MessageReceived {
                    message,
                    source: remote_addr,
                    destination: local_addr,
                },
                Err(e) => TransportEvent::Error {
                    error: format!("Error parsing SIP message: {}", e),
                },
            };
            if events_tx.send(event).await.is_err() {
                return;
            }
        }

        if buffer.len() > MAX_BUFFERED_BYTES {
            warn!("{} buffered bytes from {} without a complete message", buffer.len(), remote_addr);
            break;
        }
    }

    let _ = events_tx.send(TransportEvent::ConnectionLost { remote: remote_addr }).await;
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    async fn send_message(&self, message: &SipMessage, _destination: Option<SocketAddr>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        debug!("Sending {} {} byte message to {}", message.method(), bytes.len(), self.inner.remote_addr);

        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        let reader = self.inner.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Error shutting down TCP stream to {}: {}", self.inner.remote_addr, e);
        }
        info!("SIP TCP transport to {} closed", self.inner.remote_addr);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpTransport({} -> {})", self.inner.local_addr, self.inner.remote_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    const NOTIFY: &str = "NOTIFY sip:bob@127.0.0.1 SIP/2.0\r\n\
        Via: SIP/2.0/TCP 127.0.0.1;branch=z9hG4bKn\r\n\
        From: <sip:alice@127.0.0.1>;tag=1\r\n\
        To: <sip:bob@127.0.0.1>;tag=2\r\n\
        Call-ID: tcp-test\r\n\
        CSeq: 3 NOTIFY\r\n\
        Content-Length: 5\r\n\r\nhello";

    async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_tcp_frames_split_and_coalesced_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let (head, tail) = NOTIFY.split_at(40);
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            let rest = format!("{}\r\n{}", tail, NOTIFY);
            stream.write_all(rest.as_bytes()).await.unwrap();
            stream
        });

        let (server, mut events) = TcpTransport::accept(&listener, None).await.unwrap();
        let stream = client.await.unwrap();

        for _ in 0..2 {
            match next_event(&mut events).await {
                TransportEvent::MessageReceived { message, source, .. } => {
                    assert_eq!(message.payload(), "hello");
                    assert_eq!(source, server.remote_addr());
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        drop(stream);
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::ConnectionLost { remote } if remote == server.remote_addr()
        ));
    }

    #[tokio::test]
    async fn test_tcp_send_ignores_destination() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, _client_events) = TcpTransport::connect(addr, None).await.unwrap();
        let (_server, mut server_events) = TcpTransport::accept(&listener, None).await.unwrap();

        let message = SipMessage::parse(NOTIFY.as_bytes()).unwrap();
        client.send_message(&message, None).await.unwrap();

        match next_event(&mut server_events).await {
            TransportEvent::MessageReceived { message: received, .. } => assert_eq!(received, message),
            other => panic!("unexpected event {:?}", other),
        }

        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(matches!(
            client.send_message(&message, None).await,
            Err(Error::TransportClosed)
        ));
        assert!(matches!(
            next_event(&mut server_events).await,
            TransportEvent::ConnectionLost { .. }
        ));
    }

    #[tokio::test]
    async fn test_tcp_oversized_content_length_ends_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let head = format!(
                "OPTIONS sip:bob@127.0.0.1 SIP/2.0\r\nContent-Length: {}\r\n\r\n",
                usize::MAX
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(NOTIFY.as_bytes()).await.unwrap();
            stream
        });

        let (server, mut events) = TcpTransport::accept(&listener, None).await.unwrap();
        let _stream = client.await.unwrap();

        assert!(matches!(next_event(&mut events).await, TransportEvent::Error { .. }));
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::ConnectionLost { remote } if remote == server.remote_addr()
        ));
    }
}
