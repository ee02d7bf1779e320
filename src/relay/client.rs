//! Relay client connection
//!
//! A `RelayClient` owns one logical connection to the relay. A background
//! task connects, pumps outbound frames and forwards inbound text to the
//! caller, and reconnects after a delay when the connection drops. Frames
//! submitted while the socket is down are rejected rather than queued.
//! Dropping the client (or calling `close`) sends a close frame and ends
//! the task.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::emitter::{EventSink, SinkError};
use crate::events::GestureEvent;

use super::protocol;

/// Outbound frames in flight before `send_text` starts rejecting
const OUTBOUND_CAPACITY: usize = 16;

/// Inbound frames buffered for a slow consumer before they are dropped
const INBOUND_CAPACITY: usize = 64;

/// How long `close` waits for the close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors returned when submitting a frame
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay connection is not open")]
    NotConnected,

    #[error("relay outbound queue is full")]
    Busy,

    #[error("relay client is closed")]
    Closed,
}

/// How a session ended
enum SessionEnd {
    /// The owning client was dropped or closed
    Closed,
    /// The socket failed or the relay hung up
    Lost,
}

/// Handle to a relay connection
pub struct RelayClient {
    url: String,
    outbound_tx: Option<mpsc::Sender<String>>,
    open_rx: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Start connecting to `url`
    ///
    /// Returns the client and a receiver of inbound text frames. With
    /// `retry` set, the client reconnects after that delay whenever the
    /// connection fails; without it, the first failure is final.
    pub fn spawn(url: impl Into<String>, retry: Option<Duration>) -> (Self, mpsc::Receiver<String>) {
        let url = url.into();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (open_tx, open_rx) = watch::channel(false);

        let task = tokio::spawn(supervise(url.clone(), retry, outbound_rx, inbound_tx, open_tx));

        let client = Self {
            url,
            outbound_tx: Some(outbound_tx),
            open_rx,
            task: Some(task),
        };
        (client, inbound_rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the socket is currently open
    pub fn is_open(&self) -> bool {
        *self.open_rx.borrow()
    }

    /// Wait until the socket is open
    pub async fn wait_open(&mut self) -> Result<(), RelayError> {
        self.open_rx
            .wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| RelayError::Closed)
    }

    /// Submit one text frame without waiting
    pub fn send_text(&self, text: String) -> Result<(), RelayError> {
        let tx = self.outbound_tx.as_ref().ok_or(RelayError::Closed)?;
        if !self.is_open() {
            return Err(RelayError::NotConnected);
        }
        tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::Busy,
            mpsc::error::TrySendError::Closed(_) => RelayError::Closed,
        })
    }

    /// Close the connection and wait briefly for the close handshake
    pub async fn close(mut self) {
        self.begin_close().await
    }

    /// Stop accepting frames and hand back a future that waits for the
    /// close handshake
    fn begin_close(&mut self) -> BoxFuture<'static, ()> {
        self.outbound_tx = None;
        let task = self.task.take();
        let url = self.url.clone();

        Box::pin(async move {
            let Some(task) = task else { return };
            if tokio::time::timeout(CLOSE_TIMEOUT, task).await.is_err() {
                debug!(%url, "relay close timed out");
            }
        })
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        // Dropping the sender lets the task send a close frame and exit
        self.outbound_tx = None;
    }
}

/// Connect, run sessions and reconnect until the client goes away
async fn supervise(
    url: String,
    retry: Option<Duration>,
    mut outbound_rx: mpsc::Receiver<String>,
    inbound_tx: mpsc::Sender<String>,
    open_tx: watch::Sender<bool>,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!(%url, "relay connected");
                let _ = open_tx.send(true);
                let end = run_session(socket, &mut outbound_rx, &inbound_tx).await;
                let _ = open_tx.send(false);

                match end {
                    SessionEnd::Closed => {
                        info!(%url, "relay connection closed");
                        return;
                    }
                    SessionEnd::Lost => warn!(%url, "relay connection lost"),
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "relay connect failed");
            }
        }

        let Some(delay) = retry else {
            return;
        };

        // Wait out the retry delay, discarding anything raced in while down
        let backoff = tokio::time::sleep(delay);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => break,
                dropped = outbound_rx.recv() => match dropped {
                    Some(_) => debug!("relay down, frame dropped"),
                    None => return,
                },
            }
        }
    }
}

/// Pump frames both ways until either side ends
async fn run_session(
    socket: Socket,
    outbound_rx: &mut mpsc::Receiver<String>,
    inbound_tx: &mpsc::Sender<String>,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!(error = %e, "relay send failed");
                        return SessionEnd::Lost;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Closed;
                }
            },

            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => forward_inbound(inbound_tx, text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => forward_inbound(inbound_tx, text),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "relay read failed");
                    return SessionEnd::Lost;
                }
            },
        }
    }
}

/// Hand an inbound frame to the consumer without blocking the socket
fn forward_inbound(inbound_tx: &mpsc::Sender<String>, text: String) {
    match inbound_tx.try_send(text) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => warn!("inbound relay queue full, frame dropped"),
        // Nobody is listening; senders like the detector ignore inbound traffic
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

/// Emitter sink that forwards gestures to the relay
pub struct RelaySink {
    client: RelayClient,
}

impl RelaySink {
    pub fn new(client: RelayClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RelayClient {
        &self.client
    }
}

impl EventSink for RelaySink {
    fn name(&self) -> &str {
        "relay"
    }

    fn deliver(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        self.client
            .send_text(protocol::encode(event.kind))
            .map_err(|e| match e {
                RelayError::NotConnected | RelayError::Closed => SinkError::NotConnected,
                RelayError::Busy => SinkError::Rejected(e.to_string()),
            })
    }

    fn close(&mut self) -> BoxFuture<'static, ()> {
        self.client.begin_close()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::events::GestureKind;
    use crate::relay::RelayServer;

    async fn start_server() -> std::sync::Arc<RelayServer> {
        let server = std::sync::Arc::new(RelayServer::bind("127.0.0.1:0").await.unwrap());
        let runner = std::sync::Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });
        server
    }

    #[tokio::test]
    async fn test_unreachable_relay_rejects_frames() {
        // Reserve a port, then free it so nothing is listening there
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let (client, _inbound) = RelayClient::spawn(format!("ws://{addr}"), None);
        let mut sink = RelaySink::new(client);

        let event = GestureEvent::new(GestureKind::Eye, 500.0, Instant::now());
        assert!(matches!(sink.deliver(&event), Err(SinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_sink_reaches_other_client() {
        let server = start_server().await;
        let url = format!("ws://{}", server.local_addr());

        let (mut viewer, mut inbound) = RelayClient::spawn(url.clone(), None);
        let (mut sender, _) = RelayClient::spawn(url, None);
        viewer.wait_open().await.unwrap();
        sender.wait_open().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.client_count().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let mut sink = RelaySink::new(sender);
        let event = GestureEvent::new(GestureKind::Jaw, 800.0, Instant::now());
        tokio_test::assert_ok!(sink.deliver(&event));

        let text = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, r#"{"type":"JAW"}"#);

        viewer.close().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_sink_close_finishes_handshake() {
        let server = start_server().await;
        let (mut client, _) = RelayClient::spawn(format!("ws://{}", server.local_addr()), None);
        client.wait_open().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.client_count().await < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let mut sink = RelaySink::new(client);
        sink.close().await;

        // The session has ended by the time close resolves
        assert!(!sink.client().is_open());
        let event = GestureEvent::new(GestureKind::Eye, 500.0, Instant::now());
        assert!(matches!(sink.deliver(&event), Err(SinkError::NotConnected)));

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.client_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        server.shutdown();
    }

    #[tokio::test]
    async fn test_close_reports_closed() {
        let server = start_server().await;
        let (mut client, _) = RelayClient::spawn(format!("ws://{}", server.local_addr()), None);
        client.wait_open().await.unwrap();
        assert!(client.is_open());

        client.close().await;
        server.shutdown();
    }
}
