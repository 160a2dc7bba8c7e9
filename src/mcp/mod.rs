//! Model Context Protocol (MCP) implementation.
//!
//! This module provides the server side of an MCP session over any ordered
//! byte stream.
//!
//! # Architecture
//!
//! - `protocol` - Core MCP types and message definitions
//! - `transport` - Newline-delimited framing and the outbound queue
//! - `handler` - Capability registry (tools, resources, prompts, completions, hooks)
//! - `resources` - Resource catalog, cursor paging and URI templates
//! - `prompts` / `completion` - Prompt templates and argument completion
//! - `subscriptions` / `logging` - Session state writers and periodic notifiers
//! - `progress` / `sampling` - Out-of-band progress and nested sampling requests
//! - `state` - Shared session state
//! - `server` - Session loop

pub mod completion;
pub mod handler;
pub mod logging;
pub mod progress;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod sampling;
pub mod server;
pub mod state;
pub mod subscriptions;
pub mod transport;

pub use handler::{Capability, CapabilityKind, CapabilityRegistry};
pub use protocol::*;
pub use server::{McpServer, SessionOptions, SessionPhase, ShutdownHandle};
pub use transport::{StdioTransport, StreamTransport, Transport};
