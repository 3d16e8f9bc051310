//! Transport state machine: Idle -> Connecting -> Open -> Closing -> Idle
//! (spec §4.D). Owned directly by the scheduler loop; there is no
//! separate reader task and no mutex guarding shared state, because the
//! whole core runs on one logical execution context (spec §5).

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use vtsync_shared::protocol::{ConnectResponsePayload, Envelope, ResponseKind};

use crate::config::ClientConfig;
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TARGET: &str = "vtsync_client::transport";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Open,
    Closing,
}

/// Something the scheduler needs to react to: either a fully-decoded
/// inbound envelope, or the connection dropping.
pub enum TransportEvent {
    Envelope(Envelope),
    Closed,
}

struct ConnectOutcome {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    response: ConnectResponsePayload,
}

pub struct Transport {
    config: Arc<ClientConfig>,
    state: TransportState,
    session_id: Option<String>,
    sink: Option<SplitSink<WsStream, Message>>,
    stream: Option<SplitStream<WsStream>>,
    connect_rx: Option<oneshot::Receiver<Result<ConnectOutcome, ClientError>>>,
}

impl Transport {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            state: TransportState::Idle,
            session_id: None,
            sink: None,
            stream: None,
            connect_rx: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransportState::Open
    }

    /// Mints a session id and starts connecting, unless a connection
    /// attempt is already underway or open (spec §4.D "startSession").
    /// Idempotent: calling it again while `Connecting` or `Open` is a
    /// no-op.
    pub fn ensure_connecting(&mut self, auth: Option<(String, String)>) {
        if self.state != TransportState::Idle {
            return;
        }
        let session_id = uuid::Uuid::new_v4().to_string();
        self.session_id = Some(session_id.clone());
        self.state = TransportState::Connecting;

        let url = build_url(&self.config, &session_id, auth.as_ref());
        let (tx, rx) = oneshot::channel();
        self.connect_rx = Some(rx);

        tokio::spawn(async move {
            let outcome = connect_and_handshake(url).await;
            let _ = tx.send(outcome);
        });
    }

    /// Closes the connection (if any) and returns to `Idle`
    /// (spec §4.D "endSession").
    pub async fn end_session(&mut self) {
        self.state = TransportState::Closing;
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        self.stream = None;
        self.connect_rx = None;
        self.session_id = None;
        self.state = TransportState::Idle;
        log::debug!(target: TARGET, "session ended");
    }

    /// Serializes and transmits `envelope`. Returns `Err` without sending
    /// if the transport is not `Open`; the caller (Operation retry logic)
    /// is responsible for driving reconnection and resend (spec §4.D
    /// "send").
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(ClientError::Internal("transport not connected".to_string()));
        };
        let text = envelope.encode();
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Internal(format!("send failed: {e}")))?;
        Ok(())
    }

    /// Awaits the next thing worth reacting to: a pending connect
    /// resolving, an inbound message, or the socket closing. Safe to call
    /// repeatedly from a `tokio::select!` loop even when nothing is
    /// in-flight (it simply never resolves that branch).
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            if let Some(rx) = self.connect_rx.as_mut() {
                match rx.await {
                    Ok(Ok(outcome)) => {
                        self.connect_rx = None;
                        self.sink = Some(outcome.sink);
                        self.stream = Some(outcome.stream);
                        self.state = TransportState::Open;
                        log::info!(target: TARGET, "connection open");
                        return TransportEvent::Envelope(Envelope {
                            version: vtsync_shared::protocol::PROTOCOL_VERSION,
                            kind: "connectResponse".to_string(),
                            payload: serde_json::to_value(&outcome.response).unwrap(),
                            closure: None,
                        });
                    }
                    Ok(Err(e)) => {
                        self.connect_rx = None;
                        self.state = TransportState::Idle;
                        log::warn!(target: TARGET, "connect failed: {e}");
                        return TransportEvent::Closed;
                    }
                    Err(_) => {
                        self.connect_rx = None;
                        self.state = TransportState::Idle;
                        return TransportEvent::Closed;
                    }
                }
            }

            if let Some(stream) = self.stream.as_mut() {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => match Envelope::decode(&text) {
                        Ok(envelope) => return TransportEvent::Envelope(envelope),
                        Err(e) => {
                            log::warn!(target: TARGET, "dropping malformed message: {e}");
                            continue;
                        }
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        log::warn!(target: TARGET, "transport read error: {e}");
                        self.on_unexpected_close();
                        return TransportEvent::Closed;
                    }
                    None => {
                        self.on_unexpected_close();
                        return TransportEvent::Closed;
                    }
                }
            }

            std::future::pending::<()>().await;
        }
    }

    /// An unexpected close transitions to `Idle` without clearing
    /// in-flight operations; the scheduler's per-operation timeout drives
    /// reconnect-and-resend (spec §4.D).
    fn on_unexpected_close(&mut self) {
        self.sink = None;
        self.stream = None;
        self.state = TransportState::Idle;
    }
}

async fn connect_and_handshake(url: String) -> Result<ConnectOutcome, ClientError> {
    let (ws, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| ClientError::Internal(format!("websocket connect failed: {e}")))?;
    let (sink, mut stream) = ws.split();

    let first = stream
        .next()
        .await
        .ok_or_else(|| ClientError::Internal("connection closed before handshake".to_string()))?
        .map_err(|e| ClientError::Internal(format!("handshake read failed: {e}")))?;

    let Message::Text(text) = first else {
        return Err(ClientError::Internal(
            "expected text frame during handshake".to_string(),
        ));
    };
    let envelope = Envelope::decode(&text).map_err(|e| ClientError::Internal(e.to_string()))?;
    match ResponseKind::from_envelope(&envelope).map_err(|e| ClientError::Internal(e.to_string()))? {
        ResponseKind::Connect(response) => Ok(ConnectOutcome { sink, stream, response }),
        ResponseKind::Error(err) => Err(ClientError::Internal(err.msg)),
        _ => Err(ClientError::Internal(
            "expected connectResponse as first message".to_string(),
        )),
    }
}

fn build_url(
    config: &ClientConfig,
    session_id: &str,
    auth: Option<&(String, String)>,
) -> String {
    let mut url = url::Url::parse(&format!(
        "{}://{}:{}/connect",
        config.scheme(),
        config.host,
        config.port
    ))
    .expect("host/port always produce a valid base URL");
    url.query_pairs_mut().append_pair("sessionId", session_id);
    if let Some((provider, token)) = auth {
        url.query_pairs_mut()
            .append_pair("authProvider", provider)
            .append_pair("token", token);
    }
    url.to_string()
}
