//! MCP Everything Server - Rust Implementation
//!
//! A reference Model Context Protocol (MCP) server that exercises every part
//! of the protocol over a single stdio session: tools (including progress
//! reporting and nested sampling), paginated resources with subscriptions,
//! prompts, argument completion and peer-visible logging.
//!
//! # Architecture
//!
//! 1. **MCP Layer** (`mcp`) - Protocol types, transport, capability registry
//!    and the session loop
//! 2. **Tools Layer** (`tools`) - Demo tool bodies and the default registry
//! 3. **Support** (`config`, `metrics`, `error`) - CLI configuration, session
//!    counters, error taxonomy

pub mod config;
pub mod error;
pub mod mcp;
pub mod metrics;
pub mod tools;

pub use error::{Error, Result};

/// Server version reported during the handshake.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
