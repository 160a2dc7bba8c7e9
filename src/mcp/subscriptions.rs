//! Resource subscriptions and the periodic update notifier.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::mcp::logging::{emit_log, LogLevel};
use crate::mcp::protocol::methods;
use crate::mcp::state::{SessionState, SessionView};
use crate::mcp::transport::Outbound;

/// Params of `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeParams {
    pub uri: String,
}

/// Params of `notifications/resources/updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

/// Owns writes to the session's subscription set.
pub struct SubscriptionManager {
    state: Arc<SessionState>,
    logger: String,
}

impl SubscriptionManager {
    pub fn new(state: Arc<SessionState>, logger: impl Into<String>) -> Self {
        Self {
            state,
            logger: logger.into(),
        }
    }

    /// Add `uri` to the set (no-op if present) and acknowledge to the peer.
    pub async fn subscribe(&self, outbound: &Outbound, uri: &str) -> Result<()> {
        if self.state.add_subscription(uri).await {
            info!("Subscribed to {}", uri);
        } else {
            debug!("Already subscribed to {}", uri);
        }
        emit_log(
            outbound,
            LogLevel::Info,
            &self.logger,
            format!("Client subscribed to resource: {}", uri),
        )
        .await
    }

    /// Remove `uri` from the set (no-op if absent) and acknowledge to the peer.
    pub async fn unsubscribe(&self, outbound: &Outbound, uri: &str) -> Result<()> {
        if self.state.remove_subscription(uri).await {
            info!("Unsubscribed from {}", uri);
        } else {
            debug!("Not subscribed to {}", uri);
        }
        emit_log(
            outbound,
            LogLevel::Info,
            &self.logger,
            format!("Client unsubscribed from resource: {}", uri),
        )
        .await
    }
}

/// Every `interval`, emit `notifications/resources/updated` for each
/// subscribed URI. A failed send is logged and the remaining URIs are still
/// attempted. Runs until `cancel` fires; a send interrupted by cancellation
/// is dropped whole.
pub async fn notify_resource_updates(
    view: SessionView,
    outbound: Outbound,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'ticks: loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for uri in view.subscriptions().await {
            let params = ResourceUpdatedParams { uri };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'ticks,
                sent = outbound.notify(methods::NOTIFY_RESOURCE_UPDATED, &params) => {
                    if let Err(e) = sent {
                        warn!("Failed to notify update for {}: {}", params.uri, e);
                    }
                }
            }
        }
    }
    debug!("Resource update notifier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::logging::LoggingMessageParams;
    use crate::mcp::transport::Message;
    use crate::metrics::Metrics;
    use tokio::sync::mpsc;

    fn ack_text(msg: Message) -> String {
        match msg {
            Message::Notification(n) => {
                assert_eq!(n.method, "notifications/message");
                let params: LoggingMessageParams =
                    serde_json::from_value(n.params.unwrap()).unwrap();
                assert_eq!(params.level, LogLevel::Info);
                params.data.as_str().unwrap().to_string()
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_twice_keeps_one_entry() {
        let state = SessionState::new();
        let manager = SubscriptionManager::new(state.clone(), "test-server");
        let (tx, mut rx) = mpsc::channel(8);
        let outbound = Outbound::new(tx, Metrics::new());

        manager.subscribe(&outbound, "test://static/resource/1").await.unwrap();
        manager.subscribe(&outbound, "test://static/resource/1").await.unwrap();
        assert_eq!(
            state.view().subscriptions().await,
            vec!["test://static/resource/1".to_string()]
        );

        assert_eq!(
            ack_text(rx.recv().await.unwrap()),
            "Client subscribed to resource: test://static/resource/1"
        );
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unsubscribe_non_member_is_noop() {
        let state = SessionState::new();
        let manager = SubscriptionManager::new(state.clone(), "test-server");
        let (tx, mut rx) = mpsc::channel(8);
        let outbound = Outbound::new(tx, Metrics::new());

        manager.unsubscribe(&outbound, "test://nowhere").await.unwrap();
        assert!(state.view().subscriptions().await.is_empty());
        assert_eq!(
            ack_text(rx.recv().await.unwrap()),
            "Client unsubscribed from resource: test://nowhere"
        );
    }

    #[tokio::test]
    async fn test_notifier_emits_for_each_subscription() {
        let state = SessionState::new();
        state.add_subscription("test://a").await;
        state.add_subscription("test://b").await;

        let (tx, mut rx) = mpsc::channel(16);
        let outbound = Outbound::new(tx, Metrics::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(notify_resource_updates(
            state.view(),
            outbound,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        let mut uris = Vec::new();
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                Message::Notification(n) => {
                    assert_eq!(n.method, "notifications/resources/updated");
                    uris.push(n.params.unwrap()["uri"].as_str().unwrap().to_string());
                }
                other => panic!("expected notification, got {:?}", other),
            }
        }
        assert_eq!(uris, vec!["test://a", "test://b"]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_notifier_survives_closed_channel() {
        let state = SessionState::new();
        state.add_subscription("test://a").await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(notify_resource_updates(
            state.view(),
            Outbound::new(tx, Metrics::new()),
            Duration::from_millis(5),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());
        cancel.cancel();
        task.await.unwrap();
    }
}
