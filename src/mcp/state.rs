//! Per-session mutable state.
//!
//! The subscription set and the log threshold are written only from the
//! session loop's dispatch path. Background notifiers get a [`SessionView`],
//! which exposes reads only.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::mcp::logging::LogThreshold;

/// Shared session state.
#[derive(Debug, Default)]
pub struct SessionState {
    subscriptions: RwLock<BTreeSet<String>>,
    log_threshold: RwLock<LogThreshold>,
}

impl SessionState {
    /// Empty subscription set, most verbose threshold.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Read-only handle for background tasks.
    pub fn view(self: &Arc<Self>) -> SessionView {
        SessionView(self.clone())
    }

    /// Returns true if `uri` was not already present.
    pub(crate) async fn add_subscription(&self, uri: &str) -> bool {
        self.subscriptions.write().await.insert(uri.to_string())
    }

    /// Returns true if `uri` was present.
    pub(crate) async fn remove_subscription(&self, uri: &str) -> bool {
        self.subscriptions.write().await.remove(uri)
    }

    pub(crate) async fn set_log_threshold(&self, threshold: LogThreshold) {
        *self.log_threshold.write().await = threshold;
    }

    /// Forget everything the peer asked for; called when the session ends.
    pub(crate) async fn clear(&self) {
        self.subscriptions.write().await.clear();
        *self.log_threshold.write().await = LogThreshold::default();
    }
}

/// Read-only view of [`SessionState`].
#[derive(Debug, Clone)]
pub struct SessionView(Arc<SessionState>);

impl SessionView {
    /// Snapshot of subscribed URIs in sorted order.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.0.subscriptions.read().await.iter().cloned().collect()
    }

    pub async fn is_subscribed(&self, uri: &str) -> bool {
        self.0.subscriptions.read().await.contains(uri)
    }

    pub async fn log_threshold(&self) -> LogThreshold {
        self.0.log_threshold.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::logging::LogLevel;

    #[tokio::test]
    async fn test_subscription_idempotence() {
        let state = SessionState::new();
        let view = state.view();

        assert!(state.add_subscription("test://a").await);
        assert!(!state.add_subscription("test://a").await);
        assert_eq!(view.subscriptions().await, vec!["test://a".to_string()]);

        assert!(!state.remove_subscription("test://missing").await);
        assert!(state.remove_subscription("test://a").await);
        assert!(view.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_defaults_and_clear() {
        let state = SessionState::new();
        let view = state.view();
        assert_eq!(view.log_threshold().await.level(), Some(LogLevel::Debug));

        state.add_subscription("test://a").await;
        state.set_log_threshold(LogThreshold::parse("error")).await;
        assert!(view.is_subscribed("test://a").await);
        assert_eq!(view.log_threshold().await.level(), Some(LogLevel::Error));

        state.clear().await;
        assert!(!view.is_subscribed("test://a").await);
        assert_eq!(view.log_threshold().await.level(), Some(LogLevel::Debug));
    }
}
