//! MCP transport layer.
//!
//! Newline-delimited JSON-RPC over any async byte stream. Stdio is the
//! production instance; tests drive the same code over in-memory pipes.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, Stdin, Stdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::{
    error_codes, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::metrics::Metrics;

/// Capacity of the inbound and outbound frame queues.
const CHANNEL_CAPACITY: usize = 100;

/// Longest accepted inbound frame.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// How long `stop` waits for queued frames to be flushed.
const FLUSH_GRACE: Duration = Duration::from_secs(2);

// Top-level id of a frame too broken to decode as JSON.
static FRAME_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""id"\s*:\s*(?:"([^"\\]*)"|(-?\d+))"#).expect("frame id pattern is valid")
});

/// A message that can be sent or received.
#[derive(Debug, Clone)]
pub enum Message {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl Message {
    /// Classify and decode one frame.
    ///
    /// Frames with both `method` and `id` are requests, frames with only
    /// `method` are notifications, and frames with only `id` are responses.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);

        match (has_method, has_id) {
            (true, true) => Ok(Self::Request(serde_json::from_value(value)?)),
            (true, false) => Ok(Self::Notification(serde_json::from_value(value)?)),
            (false, true) => Ok(Self::Response(serde_json::from_value(value)?)),
            (false, false) => Err(Error::McpProtocol(
                "frame has neither method nor id".to_string(),
            )),
        }
    }

    /// Encode as a single JSON line (without the trailing newline).
    pub fn to_line(&self) -> Result<String> {
        let json = match self {
            Self::Request(req) => serde_json::to_string(req)?,
            Self::Response(res) => serde_json::to_string(res)?,
            Self::Notification(notif) => serde_json::to_string(notif)?,
        };
        Ok(json)
    }
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send {
    /// Start the transport, returning channels for messages.
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)>;

    /// Stop the transport.
    async fn stop(&mut self) -> Result<()>;
}

/// Line-framed transport over an arbitrary reader/writer pair.
///
/// A single writer task owns the output stream, so every frame is written
/// whole regardless of how many producers share the outbound sender.
pub struct StreamTransport<R, W> {
    reader: Option<R>,
    writer: Option<W>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

/// Stdio transport for MCP.
pub type StdioTransport = StreamTransport<Stdin, Stdout>;

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a transport over the given streams.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            reader_task: None,
            writer_task: None,
        }
    }
}

impl StdioTransport {
    /// Create a transport bound to the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

/// Error response for an undecodable request frame whose id can still be
/// recovered. Broken responses and notifications are never answered.
fn rejection(line: &str, err: &Error) -> Option<JsonRpcResponse> {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => {
            value.get("method")?;
            let id: RequestId = serde_json::from_value(value.get("id")?.clone()).ok()?;
            Some(JsonRpcResponse::failure(
                id,
                error_codes::INVALID_REQUEST,
                format!("Invalid request: {}", err),
            ))
        }
        Err(_) => {
            if !line.contains("\"method\"") {
                return None;
            }
            let caps = FRAME_ID.captures(line)?;
            let id = match (caps.get(1), caps.get(2)) {
                (Some(s), _) => RequestId::String(s.as_str().to_string()),
                (None, Some(n)) => RequestId::Number(n.as_str().parse().ok()?),
                (None, None) => return None,
            };
            Some(JsonRpcResponse::failure(
                id,
                error_codes::PARSE_ERROR,
                format!("Parse error: {}", err),
            ))
        }
    }
}

async fn read_frames<R: AsyncRead + Unpin>(
    reader: R,
    tx: mpsc::Sender<Message>,
    replies: mpsc::Sender<Message>,
) {
    let mut frames = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_FRAME_LEN));

    while let Some(line) = frames.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Dropping frame longer than {} bytes", MAX_FRAME_LEN);
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                error!("Error reading input: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        trace!("Received: {}", trimmed);

        match Message::parse(trimmed) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to parse message: {} ({})", trimmed, e);
                if let Some(response) = rejection(trimmed, &e) {
                    if replies.send(Message::Response(response)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("EOF on input, stopping transport");
}

async fn write_frames<W: AsyncWrite + Unpin>(writer: W, mut rx: mpsc::Receiver<Message>) {
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    while let Some(msg) = rx.recv().await {
        let frame = match msg.to_line() {
            Ok(s) => s,
            Err(e) => {
                error!("Error serializing message: {}", e);
                continue;
            }
        };

        trace!("Sending: {}", frame);

        // `send` writes the whole line and flushes before returning.
        if let Err(e) = sink.send(frame).await {
            error!("Error writing frame: {}", e);
            break;
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| Error::Internal("transport already started".to_string()))?;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::Internal("transport already started".to_string()))?;

        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

        self.reader_task = Some(tokio::spawn(read_frames(
            reader,
            incoming_tx,
            outgoing_tx.clone(),
        )));
        self.writer_task = Some(tokio::spawn(write_frames(writer, outgoing_rx)));

        Ok((incoming_rx, outgoing_tx))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        // The writer exits once every outbound sender is dropped.
        if let Some(task) = self.writer_task.take() {
            match tokio::time::timeout(FLUSH_GRACE, task).await {
                Ok(_) => debug!("Writer drained"),
                Err(_) => warn!("Writer did not drain within {:?}", FLUSH_GRACE),
            }
        }
        Ok(())
    }
}

/// Producer handle onto the session's single ordered outbound queue.
///
/// Every frame the server emits, whether a response, a notification or a
/// nested request, goes through one of these clones.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Message>,
    metrics: Arc<Metrics>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<Message>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a frame. Fails only when the writer side has gone away.
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::TransportClosed)
    }

    /// Queue a notification with the given params.
    pub async fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params)?;
        self.send(Message::Notification(notification)).await?;
        self.metrics.inc_notifications();
        Ok(())
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::RequestId;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_parse_classifies_frames() {
        let req = Message::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(matches!(req, Message::Request(r) if r.method == "ping"));

        let notif =
            Message::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(notif, Message::Notification(_)));

        let resp = Message::parse(r#"{"jsonrpc":"2.0","id":"s-1","result":{}}"#).unwrap();
        assert!(
            matches!(resp, Message::Response(r) if r.id == RequestId::String("s-1".to_string()))
        );

        assert!(Message::parse(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(Message::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_stream_transport_round_trip() {
        let (server_side, client_side) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (mut client_read, mut client_write) = tokio::io::split(client_side);

        let mut transport = StreamTransport::new(server_read, server_write);
        let (mut incoming, outgoing) = transport.start().await.unwrap();

        client_write
            .write_all(b"\n{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        match incoming.recv().await {
            Some(Message::Request(req)) => assert_eq!(req.id, RequestId::Number(7)),
            other => panic!("expected request, got {:?}", other),
        }

        outgoing
            .send(Message::Response(JsonRpcResponse::success(
                RequestId::Number(7),
                json!({}),
            )))
            .await
            .unwrap();
        drop(outgoing);
        transport.stop().await.unwrap();

        let mut buf = String::new();
        client_read.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{}}\n");
    }

    fn rejection_for(line: &str) -> Option<JsonRpcResponse> {
        let err = Message::parse(line).unwrap_err();
        rejection(line, &err)
    }

    #[test]
    fn test_rejection_recovers_request_ids() {
        let invalid = rejection_for(r#"{"jsonrpc":"2.0","id":3,"method":42}"#).unwrap();
        assert_eq!(invalid.id, RequestId::Number(3));
        assert_eq!(invalid.error.unwrap().code, error_codes::INVALID_REQUEST);

        let truncated = rejection_for(r#"{"jsonrpc":"2.0","id":"req-4","method":"ping""#).unwrap();
        assert_eq!(truncated.id, RequestId::String("req-4".to_string()));
        assert_eq!(truncated.error.unwrap().code, error_codes::PARSE_ERROR);

        let numeric = rejection_for(r#"{"jsonrpc":"2.0", "id" : -7, "method":"#).unwrap();
        assert_eq!(numeric.id, RequestId::Number(-7));
    }

    #[test]
    fn test_rejection_skips_unanswerable_frames() {
        assert!(rejection_for("not json").is_none());
        assert!(rejection_for(r#"{"jsonrpc":"2.0","method":5}"#).is_none());
        assert!(rejection_for(r#"{"jsonrpc":"2.0","id":"sampling-1","result":"#).is_none());
        assert!(rejection_for(r#"{"jsonrpc":"2.0"}"#).is_none());
    }

    #[tokio::test]
    async fn test_broken_request_is_answered_and_reading_continues() {
        let (server_side, client_side) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, mut client_write) = tokio::io::split(client_side);

        let mut transport = StreamTransport::new(server_read, server_write);
        let (mut incoming, _outgoing) = transport.start().await.unwrap();

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\n{\"jsonrpc\":\"2.0\",\"id\":10,\"method\":\"ping\"}\n")
            .await
            .unwrap();

        let mut lines = tokio::io::BufReader::new(client_read).lines();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], json!(9));
        assert_eq!(reply["error"]["code"], json!(error_codes::PARSE_ERROR));

        match incoming.recv().await {
            Some(Message::Request(req)) => assert_eq!(req.id, RequestId::Number(10)),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (server_side, _client_side) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(server_side);
        let mut transport = StreamTransport::new(r, w);
        transport.start().await.unwrap();
        assert!(transport.start().await.is_err());
    }

    #[tokio::test]
    async fn test_outbound_notify_counts_and_fails_when_closed() {
        let (tx, mut rx) = mpsc::channel(4);
        let metrics = Metrics::new();
        let outbound = Outbound::new(tx, metrics.clone());

        outbound
            .notify("notifications/resources/updated", &json!({"uri": "a"}))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(Message::Notification(n)) if n.method == "notifications/resources/updated"));
        assert_eq!(metrics.snapshot().notifications_sent, 1);

        drop(rx);
        assert!(outbound.is_closed());
        let err = outbound
            .notify("notifications/resources/updated", &json!({"uri": "a"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportClosed));
        assert_eq!(metrics.snapshot().notifications_sent, 1);
    }
}
