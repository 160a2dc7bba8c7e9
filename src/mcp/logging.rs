//! Peer-visible logging: severity levels, the session threshold, and the
//! periodic log notifier.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::methods;
use crate::mcp::state::{SessionState, SessionView};
use crate::mcp::transport::Outbound;

/// Syslog-style severity, ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Notice,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Alert,
        LogLevel::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == lowered)
            .ok_or_else(|| Error::InvalidParams(format!("unrecognized log level: {}", s)))
    }
}

/// Whether a message at `message_level` is dropped under `current_level`.
///
/// Either string failing to parse counts as ignored.
pub fn is_message_ignored(current_level: &str, message_level: &str) -> bool {
    match (
        current_level.parse::<LogLevel>(),
        message_level.parse::<LogLevel>(),
    ) {
        (Ok(current), Ok(message)) => message < current,
        _ => true,
    }
}

/// The peer's minimum log level as last requested.
///
/// Keeps the normalized string so an unrecognized request can be echoed
/// back; such a threshold suppresses everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogThreshold {
    raw: String,
    level: Option<LogLevel>,
}

impl LogThreshold {
    pub fn parse(level: &str) -> Self {
        let raw = level.trim().to_lowercase();
        let level = raw.parse().ok();
        Self { raw, level }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn level(&self) -> Option<LogLevel> {
        self.level
    }

    pub fn allows(&self, level: LogLevel) -> bool {
        self.level.map(|threshold| level >= threshold).unwrap_or(false)
    }
}

impl Default for LogThreshold {
    fn default() -> Self {
        Self {
            raw: LogLevel::Debug.as_str().to_string(),
            level: Some(LogLevel::Debug),
        }
    }
}

/// Params of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

/// Params of `logging/setLevel`. Kept as a string so unknown levels reach
/// the fail-silent path instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct SetLevelParams {
    pub level: String,
}

/// Messages the periodic notifier picks from, one per severity.
pub const LOG_CATALOG: [(LogLevel, &str); 8] = [
    (LogLevel::Debug, "This is a debug message: Variable x = 10"),
    (LogLevel::Info, "Service started successfully on port 8080."),
    (
        LogLevel::Notice,
        "User 'admin' logged in from IP 192.168.1.100.",
    ),
    (LogLevel::Warning, "Disk space is nearing capacity (90% used)."),
    (
        LogLevel::Error,
        "Failed to connect to database: Connection timed out.",
    ),
    (
        LogLevel::Critical,
        "Critical system failure: Unable to allocate memory.",
    ),
    (LogLevel::Alert, "Security alert: Possible intrusion detected."),
    (
        LogLevel::Emergency,
        "System is shutting down due to an emergency.",
    ),
];

/// Send one `notifications/message` frame, bypassing the threshold.
pub async fn emit_log(
    outbound: &Outbound,
    level: LogLevel,
    logger: &str,
    data: impl Into<Value>,
) -> Result<()> {
    let params = LoggingMessageParams {
        level,
        logger: Some(logger.to_string()),
        data: data.into(),
    };
    outbound.notify(methods::NOTIFY_MESSAGE, &params).await
}

/// Owns writes to the session's log threshold.
pub struct LoggingController {
    state: Arc<SessionState>,
    logger: String,
}

impl LoggingController {
    pub fn new(state: Arc<SessionState>, logger: impl Into<String>) -> Self {
        Self {
            state,
            logger: logger.into(),
        }
    }

    /// Store a new threshold and confirm it to the peer at `info`.
    pub async fn set_level(&self, outbound: &Outbound, level: &str) -> Result<LogThreshold> {
        let threshold = LogThreshold::parse(level);
        if threshold.level().is_none() {
            warn!(
                "Unrecognized log level '{}'; suppressing all log notifications",
                level
            );
        }
        self.state.set_log_threshold(threshold.clone()).await;
        info!("Peer log level set to {}", threshold.as_str());

        emit_log(
            outbound,
            LogLevel::Info,
            &self.logger,
            format!("Logging level set to: {}", threshold.as_str()),
        )
        .await?;
        Ok(threshold)
    }
}

fn pick_catalog_entry() -> (LogLevel, &'static str) {
    let index = rand::thread_rng().gen_range(0..LOG_CATALOG.len());
    LOG_CATALOG[index]
}

/// Every `interval`, pick a random catalog message and emit it unless the
/// current threshold suppresses it. Runs until `cancel` fires.
pub async fn notify_log_messages(
    view: SessionView,
    outbound: Outbound,
    logger: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let (level, text) = pick_catalog_entry();
        if !view.log_threshold().await.allows(level) {
            outbound.metrics().inc_suppressed();
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = emit_log(&outbound, level, &logger, text) => {
                if let Err(e) = sent {
                    warn!("Error sending log message: {}", e);
                }
            }
        }
    }
    debug!("Log notifier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::Message;
    use crate::metrics::Metrics;
    use tokio::sync::mpsc;

    #[test]
    fn test_level_order() {
        for pair in LogLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_is_message_ignored() {
        assert!(is_message_ignored("warning", "notice"));
        assert!(!is_message_ignored("warning", "error"));
        assert!(!is_message_ignored("warning", "warning"));
        assert!(!is_message_ignored("debug", "debug"));
        assert!(is_message_ignored("bogus", "emergency"));
        assert!(is_message_ignored("info", "bogus"));
    }

    #[test]
    fn test_threshold_filtering() {
        let warning = LogThreshold::parse("Warning");
        assert_eq!(warning.as_str(), "warning");
        assert!(!warning.allows(LogLevel::Notice));
        assert!(warning.allows(LogLevel::Error));

        let unknown = LogThreshold::parse("LOUD");
        assert_eq!(unknown.as_str(), "loud");
        assert_eq!(unknown.level(), None);
        for level in LogLevel::ALL {
            assert!(!unknown.allows(level));
        }
    }

    #[test]
    fn test_catalog_covers_every_level() {
        let levels: Vec<LogLevel> = LOG_CATALOG.iter().map(|(l, _)| *l).collect();
        assert_eq!(levels, LogLevel::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_set_level_confirms() {
        let state = SessionState::new();
        let controller = LoggingController::new(state.clone(), "test-server");
        let (tx, mut rx) = mpsc::channel(4);
        let outbound = Outbound::new(tx, Metrics::new());

        let threshold = controller.set_level(&outbound, "ERROR").await.unwrap();
        assert_eq!(threshold.level(), Some(LogLevel::Error));
        assert_eq!(state.view().log_threshold().await, threshold);

        match rx.recv().await.unwrap() {
            Message::Notification(n) => {
                assert_eq!(n.method, "notifications/message");
                let params: LoggingMessageParams =
                    serde_json::from_value(n.params.unwrap()).unwrap();
                assert_eq!(params.level, LogLevel::Info);
                assert_eq!(params.logger.as_deref(), Some("test-server"));
                assert_eq!(params.data, Value::from("Logging level set to: error"));
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notifier_emits_at_debug_threshold() {
        let state = SessionState::new();
        let (tx, mut rx) = mpsc::channel(16);
        let outbound = Outbound::new(tx, Metrics::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(notify_log_messages(
            state.view(),
            outbound,
            "test-server".to_string(),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                Message::Notification(n) => assert_eq!(n.method, "notifications/message"),
                other => panic!("expected notification, got {:?}", other),
            }
        }

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_notifier_silent_with_unrecognized_threshold() {
        let state = SessionState::new();
        state.set_log_threshold(LogThreshold::parse("nonsense")).await;
        let (tx, mut rx) = mpsc::channel(16);
        let metrics = Metrics::new();
        let outbound = Outbound::new(tx, metrics.clone());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(notify_log_messages(
            state.view(),
            outbound,
            "test-server".to_string(),
            Duration::from_millis(5),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(rx.try_recv().is_err());
        assert!(metrics.snapshot().log_messages_suppressed >= 1);
    }
}
