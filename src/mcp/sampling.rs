//! Server-initiated sampling requests.
//!
//! A tool that needs the peer to generate text issues a nested
//! `sampling/createMessage` request and suspends on a pending slot keyed by
//! the request id. The session loop routes the matching response back through
//! [`SamplingBridge::resolve`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::{methods, ContentBlock, JsonRpcRequest, JsonRpcResponse, RequestId, Role};
use crate::mcp::transport::{Message, Outbound};

/// Text substituted when the peer's reply carries no usable text.
pub const SAMPLING_FALLBACK: &str = "(Could not extract text from response)";

/// One message of the conversation sent to the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: ContentBlock,
}

impl SamplingMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ContentBlock::text(text),
        }
    }
}

/// Params of `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    pub messages: Vec<SamplingMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Correlates nested sampling requests with the peer's responses.
pub struct SamplingBridge {
    pending: DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>,
    next_id: AtomicU64,
    timeout: Duration,
    closed: AtomicBool,
}

impl SamplingBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            timeout,
            closed: AtomicBool::new(false),
        }
    }

    fn next_request_id(&self) -> RequestId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        RequestId::String(format!("sampling-{}", n))
    }

    /// Issue a sampling request and wait for the peer's result payload.
    pub async fn create_message(
        &self,
        outbound: &Outbound,
        params: &CreateMessageParams,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::Cancelled);
        }
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let request = JsonRpcRequest::new(
            id.clone(),
            methods::SAMPLING_CREATE_MESSAGE,
            Some(serde_json::to_value(params)?),
        );
        outbound.metrics().inc_sampling();
        if let Err(e) = outbound.send(Message::Request(request)).await {
            self.pending.remove(&id);
            return Err(e);
        }
        debug!("Sampling request {} sent", id);

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            // Slot dropped: the session is draining.
            Ok(Err(_)) => return Err(Error::Cancelled),
            Err(_) => {
                self.pending.remove(&id);
                return Err(Error::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if let Some(err) = response.error {
            return Err(Error::Sampling(format!("{} ({})", err.message, err.code)));
        }
        response
            .result
            .ok_or_else(|| Error::Sampling("response carried no result".to_string()))
    }

    /// Issue a sampling request and return the generated text, or
    /// [`SAMPLING_FALLBACK`] if the exchange fails in any way.
    pub async fn sample_text(&self, outbound: &Outbound, params: &CreateMessageParams) -> String {
        let text = match self.create_message(outbound, params).await {
            Ok(result) => extract_text(&result),
            Err(e) => {
                warn!("Sampling failed: {}", e);
                None
            }
        };

        text.unwrap_or_else(|| {
            outbound.metrics().inc_sampling_fallback();
            SAMPLING_FALLBACK.to_string()
        })
    }

    /// Hand a peer response to its waiting slot. Returns false for responses
    /// nobody is waiting on.
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        match self.pending.remove(&response.id) {
            Some((_, slot)) => slot.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop every pending slot, waking their waiters with `Cancelled`.
    pub fn cancel_all(&self) {
        self.pending.clear();
    }

    /// Refuse further requests and cancel the pending ones. Used once the
    /// peer can no longer answer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn extract_text(result: &Value) -> Option<String> {
    result
        .get("content")
        .and_then(|content| content.get("text"))
        .and_then(Value::as_str)
        .map(String::from)
}
