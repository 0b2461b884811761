//! WebSocket transport
//!
//! Speaks Socket.IO (Engine.IO v4 over a raw WebSocket, see [`socketio`]).
//! [`WsTransport::connect`] completes the handshake before returning, so the
//! server-assigned socket id is known up front.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       WsTransport                          │
//! │                                                            │
//! │  send(frame) ──cmd chan──▶ ┌────────────────────────────┐ │
//! │                            │  Background task            │ │
//! │  close()     ──cmd chan──▶ │  select! over socket, cmds  │ │
//! │                            │  and the liveness deadline  │ │
//! │                            └──────────────┬─────────────┘ │
//! │  inbound rx ◀──────── decoded WireFrames ─┘               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! [`socketio`]: super::socketio

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use phonelink_core::prelude::*;

use super::socketio::{self, EnginePacket, Handshake, SocketPacket};
use super::{Transport, INBOUND_CAPACITY};
use crate::protocol::WireFrame;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Upper bound for the open/connect exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Current state of a [`WsTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Closed by us or by the server.
    Disconnected,
}

enum Command {
    Send(WireFrame),
    Close,
}

/// Transport over a single Socket.IO WebSocket connection.
pub struct WsTransport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<ConnectionState>>,
    sid: String,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("sid", &self.sid)
            .field("state", &self.connection_state())
            .finish()
    }
}

impl WsTransport {
    /// Connect to the Socket.IO endpoint of `url` (ws/wss), complete the
    /// handshake and spawn the socket task.
    ///
    /// Returns the transport and the receiver of inbound frames.
    pub async fn connect(url: &Url) -> Result<(Self, mpsc::Receiver<WireFrame>)> {
        let endpoint = socketio::endpoint(url);
        info!("Connecting to display server at {}", endpoint);
        let (mut ws_stream, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| Error::transport(format!("Failed to connect to {endpoint}: {e}")))?;

        let (handshake, sid) = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut ws_stream))
            .await
            .map_err(|_| Error::transport("Timed out waiting for the Socket.IO handshake"))??;
        info!("Connected as socket {} (engine session {})", sid, handshake.sid);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let state = Arc::new(RwLock::new(ConnectionState::Connected));

        tokio::spawn(run_socket_task(
            ws_stream,
            cmd_rx,
            inbound_tx,
            Arc::clone(&state),
            handshake.liveness(),
        ));

        Ok((Self { cmd_tx, state, sid }, inbound_rx))
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for WsTransport {
    fn send(&self, frame: WireFrame) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.cmd_tx
            .send(Command::Send(frame))
            .map_err(|_| Error::ChannelClosed)
    }

    fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    fn socket_id(&self) -> Option<String> {
        Some(self.sid.clone())
    }
}

/// Wait for the Engine.IO open packet, join the default namespace and
/// return the handshake with our socket id.
async fn handshake(ws: &mut WsStream) -> Result<(Handshake, String)> {
    let mut open: Option<Handshake> = None;

    while let Some(msg) = ws.next().await {
        let text = match msg.map_err(|e| Error::transport(format!("Handshake read error: {e}")))? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        match EnginePacket::decode(text.as_str()) {
            Some(EnginePacket::Open(handshake)) => {
                debug!("Engine.IO open: {:?}", handshake);
                let connect = SocketPacket::Connect(None).encode()?;
                send_text(ws, EnginePacket::Message(connect).encode()).await?;
                open = Some(handshake);
            }
            Some(EnginePacket::Ping(data)) => {
                send_text(ws, EnginePacket::Pong(data).encode()).await?;
            }
            Some(EnginePacket::Message(data)) => match SocketPacket::decode(&data) {
                Some(SocketPacket::ConnectError(reason)) => {
                    return Err(Error::transport(format!("Server refused connection: {reason}")));
                }
                Some(packet) => {
                    if let Some(sid) = packet.connected_sid() {
                        let handshake = open
                            .take()
                            .ok_or_else(|| Error::protocol("connect acknowledged before open"))?;
                        return Ok((handshake, sid.to_string()));
                    }
                }
                None => {}
            },
            Some(EnginePacket::Close) => break,
            _ => {}
        }
    }
    Err(Error::transport("Connection closed during handshake"))
}

async fn send_text(ws: &mut WsStream, text: String) -> Result<()> {
    ws.send(WsMessage::Text(text.into()))
        .await
        .map_err(|e| Error::transport(format!("WebSocket write error: {e}")))
}

async fn run_socket_task(
    ws_stream: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    inbound_tx: mpsc::Sender<WireFrame>,
    state: Arc<RwLock<ConnectionState>>,
    liveness: Duration,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let deadline = tokio::time::sleep(liveness);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            // ── Incoming WebSocket message ───────────────────────────────
            msg = ws_stream.next() => {
                deadline.as_mut().reset(Instant::now() + liveness);
                let text = match msg {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Display server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // WebSocket-level Ping/Pong/Binary
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                };

                match EnginePacket::decode(text.as_str()) {
                    Some(EnginePacket::Ping(data)) => {
                        if let Err(e) = write(&mut ws_sink, EnginePacket::Pong(data).encode()).await {
                            warn!("Failed to answer ping: {}", e);
                            break;
                        }
                    }
                    Some(EnginePacket::Message(data)) => match SocketPacket::decode(&data) {
                        Some(SocketPacket::Event(frame)) => {
                            if inbound_tx.send(frame).await.is_err() {
                                debug!("Inbound receiver dropped, closing socket");
                                send_close(&mut ws_sink).await;
                                break;
                            }
                        }
                        Some(SocketPacket::Disconnect) => {
                            info!("Display server disconnected the socket");
                            break;
                        }
                        Some(SocketPacket::ConnectError(reason)) => {
                            warn!("Display server dropped the socket: {}", reason);
                            break;
                        }
                        _ => {}
                    },
                    Some(EnginePacket::Close) => {
                        info!("Engine.IO session closed by server");
                        break;
                    }
                    _ => {}
                }
            }

            // ── Outgoing command ─────────────────────────────────────────
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Send(frame)) => {
                        let text = match socketio::encode_event(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Dropping unencodable '{}' frame: {}", frame.event, e);
                                continue;
                            }
                        };
                        if let Err(e) = write(&mut ws_sink, text).await {
                            warn!("{}", e);
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        send_close(&mut ws_sink).await;
                        break;
                    }
                }
            }

            // ── Server went silent ───────────────────────────────────────
            () = &mut deadline => {
                warn!("No traffic from the display server for {:?}", liveness);
                break;
            }
        }
    }

    *state.write().unwrap_or_else(|e| e.into_inner()) = ConnectionState::Disconnected;
    debug!("Socket task finished");
}

async fn write(ws_sink: &mut WsSink, text: String) -> Result<()> {
    ws_sink
        .send(WsMessage::Text(text.into()))
        .await
        .map_err(|e| Error::transport(format!("WebSocket write error: {e}")))
}

/// Leave the namespace, then close the WebSocket.
async fn send_close(ws_sink: &mut WsSink) {
    let leave = EnginePacket::Message("1".to_string()).encode();
    if let Err(e) = write(ws_sink, leave).await {
        debug!("Error sending Socket.IO disconnect: {}", e);
    }
    if let Err(e) = ws_sink.send(WsMessage::Close(None)).await {
        debug!("Error sending Close frame: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};

    const OPEN: &str =
        r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    type ServerWs = WebSocketStream<TcpStream>;

    async fn listen() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}", listener.local_addr().unwrap())).unwrap();
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }

    async fn put(ws: &mut ServerWs, text: &str) {
        ws.send(WsMessage::Text(text.to_string().into())).await.unwrap();
    }

    async fn next_text(ws: &mut ServerWs) -> String {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("expected a text message, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_handshake_ping_and_events() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            put(&mut ws, OPEN).await;
            assert_eq!(next_text(&mut ws).await, "40");
            put(&mut ws, r#"40{"sid":"sock-42"}"#).await;

            put(&mut ws, "2").await;
            assert_eq!(next_text(&mut ws).await, "3");

            put(&mut ws, r#"42["devices",{"devices":[]}]"#).await;
            let sent = next_text(&mut ws).await;
            put(&mut ws, "41").await;
            sent
        });

        let (transport, mut inbound) = WsTransport::connect(&url).await.unwrap();
        assert_eq!(transport.socket_id().as_deref(), Some("sock-42"));

        let frame = inbound.recv().await.unwrap();
        assert_eq!(frame, WireFrame::new("devices", json!({"devices": []})));

        transport
            .send(WireFrame::new("new_device", json!({"device_id": "FooBar"})))
            .unwrap();
        let sent = server.await.unwrap();
        assert_eq!(sent, r#"42["new_device",{"device_id":"FooBar"}]"#);

        assert!(inbound.recv().await.is_none());
        assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_connect_is_an_error() {
        let (listener, url) = listen().await;
        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            put(&mut ws, OPEN).await;
            next_text(&mut ws).await;
            put(&mut ws, r#"44{"message":"Not authorized"}"#).await;
            let _ = ws.next().await;
        });

        let err = WsTransport::connect(&url).await.unwrap_err();
        assert!(err.to_string().contains("Not authorized"));
    }

    #[tokio::test]
    async fn test_close_leaves_namespace() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            put(&mut ws, OPEN).await;
            next_text(&mut ws).await;
            put(&mut ws, r#"40{"sid":"sock-7"}"#).await;
            next_text(&mut ws).await
        });

        let (transport, _inbound) = WsTransport::connect(&url).await.unwrap();
        transport.close();
        assert_eq!(server.await.unwrap(), "41");
    }
}
