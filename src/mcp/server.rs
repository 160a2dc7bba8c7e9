//! MCP server implementation.
//!
//! One [`McpServer`] drives one session: it starts the transport and the two
//! background notifiers, dispatches inbound requests one at a time through
//! the capability registry, and drains everything in order on shutdown.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::mcp::completion::{CompleteParams, CompleteResult};
use crate::mcp::handler::{CapabilityKind, CapabilityRegistry, ToolContext};
use crate::mcp::logging::{emit_log, notify_log_messages, LogLevel, LoggingController, SetLevelParams};
use crate::mcp::progress::{ProgressReporter, ProgressToken};
use crate::mcp::prompts::{GetPromptParams, ListPromptsResult};
use crate::mcp::protocol::*;
use crate::mcp::resources::{
    decode_cursor, ListResourceTemplatesResult, ListResourcesParams, ListResourcesResult,
    ReadResourceParams, ReadResourceResult,
};
use crate::mcp::sampling::SamplingBridge;
use crate::mcp::state::{SessionState, SessionView};
use crate::mcp::subscriptions::{notify_resource_updates, SubscribeParams, SubscriptionManager};
use crate::mcp::transport::{Message, Outbound, Transport};
use crate::metrics::{Metrics, Timer};
use crate::VERSION;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Ready,
    Draining,
    Stopped,
}

/// Session loop settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub name: String,
    pub version: String,
    /// Source tag on peer-visible log notifications.
    pub logger: String,
    pub subscription_interval: Duration,
    pub log_interval: Duration,
    pub sampling_timeout: Duration,
    /// Requests allowed to wait behind the one in flight. Further requests
    /// are answered with an error until the queue shrinks.
    pub max_backlog: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: "mcp-everything".to_string(),
            version: VERSION.to_string(),
            logger: "mcp-everything".to_string(),
            subscription_interval: Duration::from_secs(5),
            log_interval: Duration::from_secs(15),
            sampling_timeout: Duration::from_secs(60),
            max_backlog: 64,
        }
    }
}

/// Requests a running session to drain and stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(CancellationToken);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }
}

type InFlight<'a> = BoxFuture<'a, (RequestId, std::thread::Result<JsonRpcResponse>)>;

/// Resolves with the in-flight dispatch, or never if there is none.
async fn next_completion(in_flight: &mut Option<InFlight<'_>>) -> (RequestId, std::thread::Result<JsonRpcResponse>) {
    match in_flight {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let value = params.ok_or_else(|| Error::InvalidParams("Missing params".to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn parse_optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T> {
    match params {
        Some(Value::Null) | None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string())),
    }
}

/// MCP server.
pub struct McpServer {
    registry: Arc<CapabilityRegistry>,
    options: SessionOptions,
    state: Arc<SessionState>,
    subscriptions: SubscriptionManager,
    logging: LoggingController,
    sampling: Arc<SamplingBridge>,
    metrics: Arc<Metrics>,
    phase: watch::Sender<SessionPhase>,
    shutdown: CancellationToken,
}

impl McpServer {
    /// Create a server over a populated registry.
    pub fn new(registry: CapabilityRegistry, options: SessionOptions) -> Self {
        let state = SessionState::new();
        let (phase, _) = watch::channel(SessionPhase::Starting);
        Self {
            registry: Arc::new(registry),
            subscriptions: SubscriptionManager::new(state.clone(), options.logger.clone()),
            logging: LoggingController::new(state.clone(), options.logger.clone()),
            sampling: Arc::new(SamplingBridge::new(options.sampling_timeout)),
            metrics: Metrics::new(),
            state,
            options,
            phase,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Read-only view of the session's subscriptions and log threshold.
    pub fn session_view(&self) -> SessionView {
        self.state.view()
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
        info!("Session phase: {:?}", phase);
    }

    /// Run the session over `transport` until the peer disconnects or
    /// shutdown is requested. A server runs at most one session.
    pub async fn run<T: Transport>(&self, transport: T) -> Result<()> {
        if self.phase() != SessionPhase::Starting {
            return Err(Error::Internal("session has already run".to_string()));
        }
        let span = info_span!("session", id = %Uuid::new_v4());
        self.run_session(transport).instrument(span).await
    }

    async fn run_session<T: Transport>(&self, mut transport: T) -> Result<()> {
        info!("Starting MCP server: {} v{}", self.options.name, self.options.version);

        let (mut incoming, outgoing) = match transport.start().await {
            Ok(channels) => channels,
            Err(e) => {
                error!("Failed to start transport: {}", e);
                self.set_phase(SessionPhase::Stopped);
                return Err(e);
            }
        };
        let outbound = Outbound::new(outgoing, self.metrics.clone());

        let loops = CancellationToken::new();
        let background = vec![
            tokio::spawn(notify_resource_updates(
                self.state.view(),
                outbound.clone(),
                self.options.subscription_interval,
                loops.clone(),
            )),
            tokio::spawn(notify_log_messages(
                self.state.view(),
                outbound.clone(),
                self.options.logger.clone(),
                self.options.log_interval,
                loops.clone(),
            )),
        ];
        self.set_phase(SessionPhase::Ready);

        let outcome = self.serve(&mut incoming, &outbound).await;
        if let Err(e) = &outcome {
            error!("Session fault, draining: {}", e);
        }

        self.set_phase(SessionPhase::Draining);
        loops.cancel();
        for task in background {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Background notifier ended abnormally: {}", e);
                }
            }
        }
        self.sampling.close();
        self.state.clear().await;

        // The writer task exits once every outbound sender is gone.
        drop(outbound);
        drop(incoming);
        if let Err(e) = transport.stop().await {
            warn!("Error stopping transport: {}", e);
        }

        info!("Session metrics: {:?}", self.metrics.snapshot());
        debug!("Session counters:\n{}", self.metrics.to_prometheus());
        self.set_phase(SessionPhase::Stopped);
        info!("MCP server stopped");
        outcome
    }

    /// Ready-state loop. One request is dispatched at a time; further
    /// requests wait in arrival order while responses and notifications
    /// from the peer keep being routed, so a tool blocked on sampling can
    /// still receive its answer.
    async fn serve(&self, incoming: &mut mpsc::Receiver<Message>, outbound: &Outbound) -> Result<()> {
        let mut backlog: VecDeque<JsonRpcRequest> = VecDeque::new();
        let mut in_flight: Option<InFlight<'_>> = None;
        let mut inbound_open = true;

        loop {
            if in_flight.is_none() {
                match backlog.pop_front() {
                    Some(req) => in_flight = Some(self.start_dispatch(req, outbound.clone())),
                    None if !inbound_open => {
                        info!("Peer closed the connection");
                        return Ok(());
                    }
                    None => {}
                }
            }

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }

                (id, outcome) = next_completion(&mut in_flight) => {
                    in_flight = None;
                    let response = match outcome {
                        Ok(response) => response,
                        Err(_) => {
                            let _ = outbound
                                .send(Message::Response(JsonRpcResponse::failure(
                                    id.clone(),
                                    error_codes::INTERNAL_ERROR,
                                    "Internal error",
                                )))
                                .await;
                            return Err(Error::Internal(format!("handler for request {} panicked", id)));
                        }
                    };
                    if let Err(e) = outbound.send(Message::Response(response)).await {
                        if e.is_session_fatal() {
                            info!("Transport closed while responding to {}", id);
                            return Ok(());
                        }
                        return Err(e);
                    }
                }

                msg = incoming.recv(), if inbound_open => match msg {
                    Some(Message::Request(req)) if backlog.len() >= self.options.max_backlog => {
                        self.reject_busy(req, backlog.len(), outbound).await?;
                    }
                    Some(Message::Request(req)) => backlog.push_back(req),
                    Some(Message::Response(resp)) => self.route_response(resp),
                    Some(Message::Notification(notif)) => self.handle_notification(notif),
                    None => {
                        debug!("Inbound stream ended");
                        inbound_open = false;
                        // Nothing can answer a sampling request any more.
                        self.sampling.close();
                    }
                },
            }
        }
    }

    fn start_dispatch(&self, req: JsonRpcRequest, outbound: Outbound) -> InFlight<'_> {
        let id = req.id.clone();
        AssertUnwindSafe(self.handle_request(req, outbound))
            .catch_unwind()
            .map(move |outcome| (id, outcome))
            .boxed()
    }

    /// Answer a request that arrived while the backlog was full.
    async fn reject_busy(&self, req: JsonRpcRequest, queued: usize, outbound: &Outbound) -> Result<()> {
        self.metrics.inc_requests();
        self.metrics.inc_failed();
        let err = Error::Busy(queued);
        warn!("{} (id: {}) rejected: {}", req.method, req.id, err);
        let response = JsonRpcResponse::failure(req.id, err.rpc_code(), err.to_string());
        match outbound.send(Message::Response(response)).await {
            Err(e) if !e.is_session_fatal() => Err(e),
            _ => Ok(()),
        }
    }

    fn route_response(&self, response: JsonRpcResponse) {
        let id = response.id.clone();
        if self.sampling.resolve(response) {
            debug!("Routed response {} to its sampling request", id);
        } else {
            warn!("Received response for unknown request {}", id);
        }
    }

    /// Handle a notification.
    fn handle_notification(&self, notif: JsonRpcNotification) {
        match notif.method.as_str() {
            methods::NOTIFY_INITIALIZED => info!("Client initialized"),
            methods::NOTIFY_CANCELLED => {
                // Dispatch is not preempted; the response is still sent.
                let request_id = notif
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .unwrap_or(Value::Null);
                info!("Peer cancelled request {}", request_id);
            }
            other => debug!("Unknown notification: {}", other),
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&self, req: JsonRpcRequest, outbound: Outbound) -> JsonRpcResponse {
        debug!("Handling request: {} (id: {})", req.method, req.id);
        self.metrics.inc_requests();
        let timer = Timer::start();

        let JsonRpcRequest {
            id, method, params, ..
        } = req;
        let result = self.route(&id, &method, params, &outbound).await;

        match result {
            Ok(value) => {
                debug!("{} handled in {}ms", method, timer.elapsed_ms());
                JsonRpcResponse::success(id, value)
            }
            Err(e) => {
                self.metrics.inc_failed();
                warn!("{} (id: {}) failed: {}", method, id, e);
                JsonRpcResponse::failure(id, e.rpc_code(), e.to_string())
            }
        }
    }

    async fn route(
        &self,
        id: &RequestId,
        method: &str,
        params: Option<Value>,
        outbound: &Outbound,
    ) -> Result<Value> {
        match method {
            // Core
            methods::INITIALIZE => self.handle_initialize(params),
            methods::PING => Ok(json!({})),
            // Tools
            methods::TOOLS_LIST => Ok(serde_json::to_value(ListToolsResult {
                tools: self.registry.list_tools(),
            })?),
            methods::TOOLS_CALL => self.handle_call_tool(id, params, outbound).await,
            // Resources
            methods::RESOURCES_LIST => self.handle_list_resources(params, outbound).await,
            methods::RESOURCES_READ => self.handle_read_resource(params),
            methods::RESOURCES_TEMPLATES_LIST => {
                Ok(serde_json::to_value(ListResourceTemplatesResult {
                    resource_templates: self.registry.resources()?.list_templates(),
                })?)
            }
            methods::RESOURCES_SUBSCRIBE => {
                let params: SubscribeParams = parse_params(params)?;
                self.subscriptions.subscribe(outbound, &params.uri).await?;
                self.registry
                    .run_hooks(CapabilityKind::SubscribeHook, &params.uri)
                    .await;
                Ok(json!({}))
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                let params: SubscribeParams = parse_params(params)?;
                self.subscriptions.unsubscribe(outbound, &params.uri).await?;
                self.registry
                    .run_hooks(CapabilityKind::UnsubscribeHook, &params.uri)
                    .await;
                Ok(json!({}))
            }
            // Prompts
            methods::PROMPTS_LIST => Ok(serde_json::to_value(ListPromptsResult {
                prompts: self.registry.list_prompts(),
                next_cursor: None,
            })?),
            methods::PROMPTS_GET => {
                let params: GetPromptParams = parse_params(params)?;
                let result = self.registry.get_prompt(&params.name, &params.arguments)?;
                Ok(serde_json::to_value(result)?)
            }
            // Completions
            methods::COMPLETION_COMPLETE => {
                let params: CompleteParams = parse_params(params)?;
                let completion = self.registry.complete(&params.reference, &params.argument)?;
                Ok(serde_json::to_value(CompleteResult { completion })?)
            }
            // Logging
            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelParams = parse_params(params)?;
                let threshold = self.logging.set_level(outbound, &params.level).await?;
                self.registry
                    .run_hooks(CapabilityKind::LogLevelHook, threshold.as_str())
                    .await;
                Ok(json!({}))
            }
            other => Err(Error::MethodNotFound(other.to_string())),
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        if let Some(client) = params.as_ref().and_then(|p| p.get("clientInfo")) {
            info!("Client: {}", client);
        }

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities::advertised(),
            server_info: ServerInfo {
                name: self.options.name.clone(),
                version: self.options.version.clone(),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request.
    async fn handle_call_tool(
        &self,
        id: &RequestId,
        params: Option<Value>,
        outbound: &Outbound,
    ) -> Result<Value> {
        let params: CallToolParams = parse_params(params)?;

        // Without an explicit token, progress is keyed by the request id.
        let token = params
            .meta
            .and_then(|m| m.progress_token)
            .unwrap_or_else(|| ProgressToken::from(id.clone()));

        let ctx = ToolContext {
            progress: ProgressReporter::new(token, outbound.clone()),
            sampling: self.sampling.clone(),
            outbound: outbound.clone(),
        };

        let result = self
            .registry
            .call_tool(&params.name, params.arguments, &ctx)
            .await?;
        Ok(serde_json::to_value(result)?)
    }

    /// Handle list resources request.
    async fn handle_list_resources(&self, params: Option<Value>, outbound: &Outbound) -> Result<Value> {
        let params: ListResourcesParams = parse_optional_params(params)?;
        let catalog = self.registry.resources()?;

        if let Some(cursor) = params.cursor.as_deref() {
            if decode_cursor(cursor).is_err()
                && self.state.view().log_threshold().await.allows(LogLevel::Error)
            {
                let report = emit_log(
                    outbound,
                    LogLevel::Error,
                    &self.options.logger,
                    format!("Invalid cursor '{}', listing from the start", cursor),
                )
                .await;
                if let Err(e) = report {
                    debug!("Could not report invalid cursor: {}", e);
                }
            }
        }

        let page = catalog.list(params.cursor.as_deref(), params.page_size);
        Ok(serde_json::to_value(ListResourcesResult::from(page))?)
    }

    /// Handle read resource request.
    fn handle_read_resource(&self, params: Option<Value>) -> Result<Value> {
        let params: ReadResourceParams = parse_params(params)?;
        let resource = self.registry.resources()?.get(&params.uri)?;
        Ok(serde_json::to_value(ReadResourceResult {
            contents: vec![resource.contents()],
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::StreamTransport;

    #[test]
    fn test_new_server_is_starting() {
        let server = McpServer::new(CapabilityRegistry::new(), SessionOptions::default());
        assert_eq!(server.phase(), SessionPhase::Starting);
        assert!(!server.shutdown_handle().is_shutdown());
    }

    #[test]
    fn test_parse_params() {
        let params: SubscribeParams = parse_params(Some(json!({"uri": "test://a"}))).unwrap();
        assert_eq!(params.uri, "test://a");

        assert!(matches!(
            parse_params::<SubscribeParams>(None),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(
            parse_params::<SubscribeParams>(Some(json!({"url": "x"}))),
            Err(Error::InvalidParams(_))
        ));

        let list: ListResourcesParams = parse_optional_params(None).unwrap();
        assert!(list.cursor.is_none());
    }

    #[tokio::test]
    async fn test_session_stops_on_eof_and_cannot_rerun() {
        let server = McpServer::new(CapabilityRegistry::new(), SessionOptions::default());
        let (_client, server_io) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(server_io);
        drop(_client);

        server.run(StreamTransport::new(read, write)).await.unwrap();
        assert_eq!(server.phase(), SessionPhase::Stopped);

        let (_client, server_io) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(server_io);
        assert!(server.run(StreamTransport::new(read, write)).await.is_err());
    }
}
