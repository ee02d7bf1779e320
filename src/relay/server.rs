//! WebSocket relay server
//!
//! Every text or binary frame a client sends is forwarded verbatim to all
//! other connected clients. The relay does not inspect payloads.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Frames queued per client before a slow client starts losing messages
const FANOUT_CAPACITY: usize = 256;

/// A frame tagged with the client that sent it
#[derive(Debug, Clone)]
struct Relayed {
    from: u64,
    message: Message,
}

/// Shared server state
struct ServerState {
    clients: HashMap<u64, SocketAddr>,
}

/// Relay server accepting WebSocket clients
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<RwLock<ServerState>>,
    fanout_tx: broadcast::Sender<Relayed>,
    shutdown_tx: broadcast::Sender<()>,
    next_id: AtomicU64,
}

impl RelayServer {
    /// Bind the relay to `addr` (use port 0 for an ephemeral port)
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind relay on {addr}"))?;
        let local_addr = listener.local_addr().context("failed to read relay address")?;

        let (fanout_tx, _) = broadcast::channel(FANOUT_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(%local_addr, "relay server listening");

        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(RwLock::new(ServerState {
                clients: HashMap::new(),
            })),
            fanout_tx,
            shutdown_tx,
            next_id: AtomicU64::new(1),
        })
    }

    /// Address the relay is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connected clients
    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    /// Accept clients until `shutdown` is called
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("relay accept loop shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                        let state = Arc::clone(&self.state);
                        let fanout_tx = self.fanout_tx.clone();
                        let mut client_shutdown = self.shutdown_tx.subscribe();

                        tokio::spawn(async move {
                            tokio::select! {
                                result = Self::handle_client(id, stream, peer, fanout_tx, Arc::clone(&state)) => {
                                    if let Err(e) = result {
                                        warn!(%peer, ?e, "relay client error");
                                    }
                                }
                                _ = client_shutdown.recv() => {
                                    debug!(%peer, "relay client handler shutting down");
                                }
                            }
                            state.write().await.clients.remove(&id);
                        });
                    }
                    Err(e) => {
                        error!(?e, "relay accept error");
                    }
                },
            }
        }
    }

    /// Serve one client until it disconnects
    async fn handle_client(
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        fanout_tx: broadcast::Sender<Relayed>,
        state: Arc<RwLock<ServerState>>,
    ) -> Result<()> {
        let ws = accept_async(stream)
            .await
            .context("websocket handshake failed")?;
        let (mut write, mut read) = ws.split();
        let mut fanout_rx = fanout_tx.subscribe();

        state.write().await.clients.insert(id, peer);
        info!(%peer, id, "relay client connected");

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                        debug!(%peer, ?message, "relaying message");
                        // No receivers just means nobody else is connected
                        let _ = fanout_tx.send(Relayed { from: id, message });
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%peer, ?e, "relay read error");
                        break;
                    }
                },

                relayed = fanout_rx.recv() => match relayed {
                    Ok(relayed) if relayed.from == id => {}
                    Ok(relayed) => {
                        if write.send(relayed.message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%peer, skipped = n, "relay client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        info!(%peer, id, "relay client disconnected");
        Ok(())
    }

    /// Stop accepting and disconnect all clients
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("relay server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpStream;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server() -> Arc<RelayServer> {
        let server = Arc::new(RelayServer::bind("127.0.0.1:0").await.unwrap());
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });
        server
    }

    async fn connect(server: &RelayServer) -> Client {
        let url = format!("ws://{}", server.local_addr());
        let (ws, _) = connect_async(url.as_str()).await.unwrap();
        ws
    }

    async fn wait_for_clients(server: &RelayServer, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while server.client_count().await < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn next_text(client: &mut Client) -> String {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return text;
            }
        }
    }

    #[tokio::test]
    async fn test_relays_to_other_clients_only() {
        let server = start_server().await;
        let mut sender = connect(&server).await;
        let mut viewer = connect(&server).await;
        let mut other = connect(&server).await;
        wait_for_clients(&server, 3).await;

        sender
            .send(Message::Text(r#"{"type":"BLINK"}"#.to_string()))
            .await
            .unwrap();

        assert_eq!(next_text(&mut viewer).await, r#"{"type":"BLINK"}"#);
        assert_eq!(next_text(&mut other).await, r#"{"type":"BLINK"}"#);

        // The sender should not hear its own message back
        let echoed = tokio::time::timeout(Duration::from_millis(200), sender.next()).await;
        assert!(echoed.is_err());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_relays_payload_verbatim() {
        let server = start_server().await;
        let mut sender = connect(&server).await;
        let mut viewer = connect(&server).await;
        wait_for_clients(&server, 2).await;

        let odd = "not even json";
        sender.send(Message::Text(odd.to_string())).await.unwrap();
        assert_eq!(next_text(&mut viewer).await, odd);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_is_tracked() {
        let server = start_server().await;
        let mut client = connect(&server).await;
        wait_for_clients(&server, 1).await;

        client.close(None).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.client_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        server.shutdown();
    }
}
