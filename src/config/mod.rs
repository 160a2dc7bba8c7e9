//! Configuration management for the MCP Everything server.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::mcp::server::SessionOptions;

/// Command-line arguments for the MCP Everything server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-everything")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reference MCP server exercising every protocol feature over stdio")]
pub struct Args {
    /// Server name reported during the handshake
    #[arg(long, default_value = "mcp-everything", env = "MCP_EVERYTHING_NAME")]
    pub name: String,

    /// Logger tag attached to peer-visible log notifications
    #[arg(long, default_value = "mcp-everything", env = "MCP_EVERYTHING_LOGGER")]
    pub logger: String,

    /// Default resources/list page size
    #[arg(long, default_value = "10", env = "MCP_EVERYTHING_PAGE_SIZE")]
    pub page_size: usize,

    /// Seconds between resource update notifications
    #[arg(long, default_value = "5", env = "MCP_EVERYTHING_SUBSCRIPTION_INTERVAL")]
    pub subscription_interval: u64,

    /// Seconds between random log notifications
    #[arg(long, default_value = "15", env = "MCP_EVERYTHING_LOG_INTERVAL")]
    pub log_interval: u64,

    /// Seconds to wait for the peer to answer a sampling request
    #[arg(long, default_value = "60", env = "MCP_EVERYTHING_SAMPLING_TIMEOUT")]
    pub sampling_timeout: u64,

    /// Default duration of longRunningOperation, in seconds
    #[arg(long, default_value = "10", env = "MCP_EVERYTHING_LONG_RUNNING_DURATION")]
    pub long_running_duration: f64,

    /// Default step count of longRunningOperation
    #[arg(long, default_value = "5", env = "MCP_EVERYTHING_LONG_RUNNING_STEPS")]
    pub long_running_steps: u64,

    /// Requests allowed to wait behind the one being handled
    #[arg(long, default_value = "64", env = "MCP_EVERYTHING_MAX_BACKLOG")]
    pub max_backlog: usize,

    /// Write session counters in Prometheus text format here on exit
    #[arg(long, env = "MCP_EVERYTHING_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "MCP_EVERYTHING_DEBUG")]
    pub debug: bool,

    /// Diagnostic log format on stderr
    #[arg(long, default_value = "text", env = "MCP_EVERYTHING_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Diagnostic log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server name
    pub name: String,
    /// Peer log source tag
    pub logger: String,
    /// Default page size
    pub page_size: usize,
    /// Subscription notify interval (seconds)
    pub subscription_interval: u64,
    /// Log notify interval (seconds)
    pub log_interval: u64,
    /// Sampling timeout (seconds)
    pub sampling_timeout: u64,
    /// longRunningOperation default duration (seconds)
    pub long_running_duration: f64,
    /// longRunningOperation default steps
    pub long_running_steps: u64,
    /// Queued request limit
    pub max_backlog: usize,
    /// Prometheus counter dump written on exit
    pub metrics_file: Option<PathBuf>,
    /// Debug mode
    pub debug: bool,
    /// Log format
    pub log_format: LogFormat,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            name: args.name,
            logger: args.logger,
            page_size: args.page_size,
            subscription_interval: args.subscription_interval,
            log_interval: args.log_interval,
            sampling_timeout: args.sampling_timeout,
            long_running_duration: args.long_running_duration,
            long_running_steps: args.long_running_steps,
            max_backlog: args.max_backlog,
            metrics_file: args.metrics_file,
            debug: args.debug,
            log_format: args.log_format,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "mcp-everything".to_string(),
            logger: "mcp-everything".to_string(),
            page_size: 10,
            subscription_interval: 5,
            log_interval: 15,
            sampling_timeout: 60,
            long_running_duration: 10.0,
            long_running_steps: 5,
            max_backlog: 64,
            metrics_file: None,
            debug: false,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page size must be positive".to_string()));
        }
        if self.max_backlog == 0 {
            return Err(Error::Config("request backlog must hold at least one request".to_string()));
        }
        if self.subscription_interval == 0 || self.log_interval == 0 {
            return Err(Error::Config(
                "notification intervals must be at least one second".to_string(),
            ));
        }
        if self.sampling_timeout == 0 {
            return Err(Error::Config("sampling timeout must be positive".to_string()));
        }
        if !(self.long_running_duration.is_finite() && self.long_running_duration >= 0.0) {
            return Err(Error::Config(
                "long running duration must be a non-negative number".to_string(),
            ));
        }
        if self.long_running_steps == 0 {
            return Err(Error::Config("long running steps must be positive".to_string()));
        }
        Ok(())
    }

    /// Session loop settings derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            name: self.name.clone(),
            logger: self.logger.clone(),
            subscription_interval: Duration::from_secs(self.subscription_interval),
            log_interval: Duration::from_secs(self.log_interval),
            sampling_timeout: Duration::from_secs(self.sampling_timeout),
            max_backlog: self.max_backlog,
            ..SessionOptions::default()
        }
    }
}
