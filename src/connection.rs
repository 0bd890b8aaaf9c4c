use crate::error::{ObsError, Result};
use crate::protocol::{
    self, op, BatchResult, Envelope, Hello, Identified, Identify, Request, RequestBatch,
    RequestBatchResponse, RequestResponse,
};
use crate::requests::DeviceRequest;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;

/// Close code obs-websocket uses for a rejected Identify
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

/// WebSocket connection state
struct ConnectionState {
    /// Pending requests waiting for responses, keyed by request id
    pending_requests: HashMap<String, oneshot::Sender<Envelope>>,
    /// Channel for sending outgoing messages
    ws_tx: mpsc::UnboundedSender<Message>,
}

/// Identified obs-websocket session
///
/// Owns the socket through two background tasks: one forwarding outgoing
/// frames, one routing responses back to their waiting requests. The
/// [`closed`](ObsConnection::closed) token fires once either side goes away.
pub struct ObsConnection {
    state: Arc<Mutex<ConnectionState>>,
    closed: CancellationToken,
    request_timeout: Duration,
    rpc_version: u32,
}

impl ObsConnection {
    /// Connect to a WebSocket URL and complete the Hello/Identify handshake
    pub async fn connect(
        url: impl Into<String>,
        password: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let url = url.into();
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = timeout(request_timeout, connect_async(&url))
            .await
            .map_err(|_| ObsError::Timeout)??;
        let (mut write, mut read) = ws_stream.split();

        let rpc_version = timeout(
            request_timeout,
            Self::identify(&mut write, &mut read, password),
        )
        .await
        .map_err(|_| ObsError::Timeout)??;
        tracing::info!("Identified with {} (rpc v{})", url, rpc_version);

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let closed = CancellationToken::new();

        let state = Arc::new(Mutex::new(ConnectionState {
            pending_requests: HashMap::new(),
            ws_tx,
        }));

        // Spawn task to forward outgoing messages to WebSocket
        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_closed.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    msg = ws_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            tracing::error!("Failed to send message: {}", e);
                            writer_closed.cancel();
                            break;
                        }
                    }
                }
            }
        });

        // Spawn task to receive and route incoming messages
        let state_clone = state.clone();
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                let msg_result = tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    msg = read.next() => msg,
                };
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = Self::handle_message(&state_clone, &text).await {
                            tracing::error!("Error handling message: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("WebSocket connection closed: {:?}", frame);
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            // Connection closed; mark it before failing pending requests so
            // no new request registers after the clear
            reader_closed.cancel();
            state_clone.lock().await.pending_requests.clear();
        });

        Ok(Self {
            state,
            closed,
            request_timeout,
            rpc_version,
        })
    }

    /// Wait for Hello, answer with Identify and wait for Identified
    async fn identify<W, R>(write: &mut W, read: &mut R, password: Option<&str>) -> Result<u32>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
        R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        let hello: Hello = Self::next_envelope(read, op::HELLO).await?.payload()?;
        tracing::debug!("Hello from obs-websocket {:?}", hello.obs_web_socket_version);

        let authentication = match (&hello.authentication, password) {
            (Some(challenge), Some(password)) => {
                Some(protocol::authentication_string(password, challenge))
            }
            (Some(_), None) => {
                return Err(ObsError::AuthenticationFailed(
                    "server requires a password".to_string(),
                ))
            }
            (None, _) => None,
        };

        let identify = Identify {
            rpc_version: protocol::RPC_VERSION,
            authentication,
            event_subscriptions: 0,
        };
        let json = serde_json::to_string(&Envelope::new(op::IDENTIFY, &identify)?)?;
        write.send(Message::Text(json)).await?;

        let identified: Identified = Self::next_envelope(read, op::IDENTIFIED).await?.payload()?;
        Ok(identified.negotiated_rpc_version)
    }

    /// Read frames until one with the wanted opcode arrives
    async fn next_envelope<R>(read: &mut R, wanted: u8) -> Result<Envelope>
    where
        R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => {
                    let envelope: Envelope = serde_json::from_str(&text)?;
                    if envelope.op == wanted {
                        return Ok(envelope);
                    }
                    tracing::debug!("Ignoring op {} during handshake", envelope.op);
                }
                Message::Close(Some(frame)) if u16::from(frame.code) == CLOSE_AUTHENTICATION_FAILED => {
                    return Err(ObsError::AuthenticationFailed(frame.reason.to_string()));
                }
                Message::Close(_) => return Err(ObsError::ConnectionClosed),
                _ => {}
            }
        }
        Err(ObsError::ConnectionClosed)
    }

    /// Handle an incoming message
    async fn handle_message(state: &Arc<Mutex<ConnectionState>>, text: &str) -> Result<()> {
        tracing::debug!("Received: {}", text);

        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.op {
            op::REQUEST_RESPONSE | op::REQUEST_BATCH_RESPONSE => {
                let request_id = envelope
                    .d
                    .get("requestId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ObsError::InvalidResponse("Response without requestId".to_string()))?
                    .to_string();

                let mut state = state.lock().await;
                if let Some(tx) = state.pending_requests.remove(&request_id) {
                    let _ = tx.send(envelope);
                } else {
                    tracing::warn!("Response for unknown request {}", request_id);
                }
            }
            op::EVENT => {}
            other => tracing::debug!("Ignoring op {}", other),
        }

        Ok(())
    }

    /// Send a message and wait for the response carrying the same request id
    async fn round_trip<T: Serialize>(&self, opcode: u8, payload: &T, request_id: String) -> Result<Envelope> {
        if self.closed.is_cancelled() {
            return Err(ObsError::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();

        // Register the pending request
        {
            let mut state = self.state.lock().await;
            if self.closed.is_cancelled() {
                return Err(ObsError::ConnectionClosed);
            }
            state.pending_requests.insert(request_id.clone(), tx);

            let json = serde_json::to_string(&Envelope::new(opcode, payload)?)?;
            tracing::debug!("Sending: {}", json);

            state
                .ws_tx
                .send(Message::Text(json))
                .map_err(|_| ObsError::ConnectionClosed)?;
        }

        // Wait for response with timeout
        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ObsError::ConnectionClosed),
            Err(_) => {
                // Timeout - remove from pending requests
                let mut state = self.state.lock().await;
                state.pending_requests.remove(&request_id);
                Err(ObsError::Timeout)
            }
        }
    }

    /// Send one request and return its response data
    ///
    /// A failing request status is turned into [`ObsError::RequestFailed`].
    pub async fn call(&self, request: &DeviceRequest) -> Result<Value> {
        let request_id = protocol::new_request_id();
        let payload = Request {
            request_type: request.request_type().to_string(),
            request_id: request_id.clone(),
            request_data: request.request_data(),
        };

        let response: RequestResponse = self
            .round_trip(op::REQUEST, &payload, request_id)
            .await?
            .payload()?;

        if !response.request_status.result {
            return Err(ObsError::RequestFailed {
                request_type: response.request_type,
                code: response.request_status.code,
                comment: response.request_status.comment,
            });
        }

        Ok(response.response_data.unwrap_or(Value::Null))
    }

    /// Send requests as one serial batch and return the per-request results
    ///
    /// Individual failures are reported in the results, not as an error.
    pub async fn call_batch(&self, requests: &[DeviceRequest]) -> Result<Vec<BatchResult>> {
        let request_id = protocol::new_request_id();
        let payload = RequestBatch {
            request_id: request_id.clone(),
            halt_on_failure: false,
            execution_type: protocol::EXECUTION_SERIAL_REALTIME,
            requests: requests.iter().map(DeviceRequest::to_batch_entry).collect(),
        };

        let response: RequestBatchResponse = self
            .round_trip(op::REQUEST_BATCH, &payload, request_id)
            .await?
            .payload()?;

        Ok(response.results)
    }

    /// Token cancelled once the socket is gone
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Negotiated RPC version
    pub fn rpc_version(&self) -> u32 {
        self.rpc_version
    }

    /// Close the socket
    pub fn close(&self) {
        self.closed.cancel();
    }
}
