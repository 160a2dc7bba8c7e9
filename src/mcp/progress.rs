//! MCP Progress Notifications
//!
//! Support for emitting progress updates during long-running operations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mcp::protocol::{methods, RequestId};
use crate::mcp::transport::Outbound;

/// Progress token for tracking operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl From<RequestId> for ProgressToken {
    fn from(id: RequestId) -> Self {
        match id {
            RequestId::String(s) => Self::String(s),
            RequestId::Number(n) => Self::Number(n),
        }
    }
}

/// Progress notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub progress_token: ProgressToken,
    pub progress: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Progress reporter bound to one in-flight request.
#[derive(Clone)]
pub struct ProgressReporter {
    token: ProgressToken,
    outbound: Outbound,
}

impl ProgressReporter {
    /// Bind a reporter to `token`, emitting through `outbound`.
    pub fn new(token: ProgressToken, outbound: Outbound) -> Self {
        Self { token, outbound }
    }

    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Emit one `notifications/progress` frame.
    ///
    /// Send failures are ignored; the invocation keeps running and the
    /// session loop notices the closed transport on its own.
    pub async fn report(&self, step: u64, total: u64) {
        let params = ProgressParams {
            progress_token: self.token.clone(),
            progress: step,
            total: Some(total),
        };
        if let Err(e) = self.outbound.notify(methods::NOTIFY_PROGRESS, &params).await {
            debug!("Dropping progress {}/{}: {}", step, total, e);
        }
    }
}
