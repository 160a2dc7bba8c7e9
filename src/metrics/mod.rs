//! Session counters.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total requests processed
    pub requests_total: AtomicU64,
    /// Requests answered with an error
    pub requests_failed: AtomicU64,
    /// Tool calls
    pub tool_calls: AtomicU64,
    /// Notifications queued to the peer
    pub notifications_sent: AtomicU64,
    /// Log messages dropped by the level threshold
    pub log_messages_suppressed: AtomicU64,
    /// Nested sampling requests issued
    pub sampling_requests: AtomicU64,
    /// Sampling calls that resolved to the fallback text
    pub sampling_fallbacks: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_suppressed(&self) {
        self.log_messages_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sampling(&self) {
        self.sampling_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sampling_fallback(&self) {
        self.sampling_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            log_messages_suppressed: self.log_messages_suppressed.load(Ordering::Relaxed),
            sampling_requests: self.sampling_requests.load(Ordering::Relaxed),
            sampling_fallbacks: self.sampling_fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP mcp_everything_requests_total Total number of requests
# TYPE mcp_everything_requests_total counter
mcp_everything_requests_total {}

# HELP mcp_everything_requests_failed Requests answered with an error
# TYPE mcp_everything_requests_failed counter
mcp_everything_requests_failed {}

# HELP mcp_everything_tool_calls Tool calls count
# TYPE mcp_everything_tool_calls counter
mcp_everything_tool_calls {}

# HELP mcp_everything_notifications_sent Notifications queued to the peer
# TYPE mcp_everything_notifications_sent counter
mcp_everything_notifications_sent {}

# HELP mcp_everything_log_messages_suppressed Log messages below the threshold
# TYPE mcp_everything_log_messages_suppressed counter
mcp_everything_log_messages_suppressed {}

# HELP mcp_everything_sampling_requests Sampling requests issued to the peer
# TYPE mcp_everything_sampling_requests counter
mcp_everything_sampling_requests {}

# HELP mcp_everything_sampling_fallbacks Sampling calls resolved with fallback text
# TYPE mcp_everything_sampling_fallbacks counter
mcp_everything_sampling_fallbacks {}
"#,
            s.requests_total,
            s.requests_failed,
            s.tool_calls,
            s.notifications_sent,
            s.log_messages_suppressed,
            s.sampling_requests,
            s.sampling_fallbacks
        )
    }

    /// Write the Prometheus export to `path`, replacing any previous dump.
    pub async fn write_prometheus(&self, path: &Path) -> crate::Result<()> {
        tokio::fs::write(path, self.to_prometheus()).await?;
        Ok(())
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub tool_calls: u64,
    pub notifications_sent: u64,
    pub log_messages_suppressed: u64,
    pub sampling_requests: u64,
    pub sampling_fallbacks: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.inc_requests();
        metrics.inc_requests();
        metrics.inc_failed();
        metrics.inc_tool_calls();
        metrics.inc_suppressed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_failed, 1);
        assert_eq!(snapshot.tool_calls, 1);
        assert_eq!(snapshot.log_messages_suppressed, 1);
        assert_eq!(snapshot.notifications_sent, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.inc_sampling();
        metrics.inc_sampling_fallback();

        let text = metrics.to_prometheus();
        assert!(text.contains("mcp_everything_sampling_requests 1"));
        assert!(text.contains("mcp_everything_sampling_fallbacks 1"));
        assert!(text.contains("# TYPE mcp_everything_requests_total counter"));
    }

    #[tokio::test]
    async fn test_write_prometheus_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.prom");
        let metrics = Metrics::new();
        metrics.inc_requests();

        metrics.write_prometheus(&path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("mcp_everything_requests_total 1"));
    }
}
