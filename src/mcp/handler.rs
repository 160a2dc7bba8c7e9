//! Capability registry.
//!
//! Every tool, resource provider, prompt, completion table and session hook
//! the server exposes is registered here under a [`CapabilityKind`] and a
//! name, and resolved by the session loop at dispatch time.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mcp::completion::{Completion, CompletionArgument, CompletionReference};
use crate::mcp::progress::ProgressReporter;
use crate::mcp::prompts::{GetPromptResult, Prompt};
use crate::mcp::protocol::{ContentBlock, Tool, ToolResult};
use crate::mcp::resources::ResourceCatalog;
use crate::mcp::sampling::SamplingBridge;
use crate::mcp::transport::Outbound;

/// Closed set of things that can be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Tool,
    ResourceProvider,
    PromptProvider,
    CompletionProvider,
    SubscribeHook,
    UnsubscribeHook,
    LogLevelHook,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tool => "tool",
            Self::ResourceProvider => "resource provider",
            Self::PromptProvider => "prompt",
            Self::CompletionProvider => "completion reference",
            Self::SubscribeHook => "subscribe hook",
            Self::UnsubscribeHook => "unsubscribe hook",
            Self::LogLevelHook => "log level hook",
        };
        f.write_str(name)
    }
}

/// Per-invocation handles given to a tool.
#[derive(Clone)]
pub struct ToolContext {
    /// Progress reporter bound to the calling request.
    pub progress: ProgressReporter,
    /// Nested request bridge for tools that ask the peer to generate text.
    pub sampling: Arc<SamplingBridge>,
    pub outbound: Outbound,
}

/// Handler for MCP tool calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> Tool;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult>;
}

/// A named prompt template.
pub trait PromptHandler: Send + Sync {
    fn definition(&self) -> Prompt;

    /// Render the conversation for the supplied arguments.
    fn render(&self, arguments: &HashMap<String, String>) -> Result<GetPromptResult>;
}

/// Candidate values for the arguments of one completion reference.
pub trait CompletionHandler: Send + Sync {
    fn complete(&self, argument: &CompletionArgument) -> Result<Completion>;
}

/// Observer run after a subscribe, unsubscribe or log level request has
/// been applied. Receives the URI or the normalized level.
#[async_trait]
pub trait SessionHook: Send + Sync {
    async fn on_event(&self, value: &str) -> Result<()>;
}

/// A registered capability.
#[derive(Clone)]
pub enum Capability {
    Tool(Arc<dyn ToolHandler>),
    ResourceProvider(Arc<ResourceCatalog>),
    PromptProvider(Arc<dyn PromptHandler>),
    CompletionProvider(Arc<dyn CompletionHandler>),
    SubscribeHook(Arc<dyn SessionHook>),
    UnsubscribeHook(Arc<dyn SessionHook>),
    LogLevelHook(Arc<dyn SessionHook>),
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Tool(_) => CapabilityKind::Tool,
            Self::ResourceProvider(_) => CapabilityKind::ResourceProvider,
            Self::PromptProvider(_) => CapabilityKind::PromptProvider,
            Self::CompletionProvider(_) => CapabilityKind::CompletionProvider,
            Self::SubscribeHook(_) => CapabilityKind::SubscribeHook,
            Self::UnsubscribeHook(_) => CapabilityKind::UnsubscribeHook,
            Self::LogLevelHook(_) => CapabilityKind::LogLevelHook,
        }
    }

    fn hook(&self) -> Option<&Arc<dyn SessionHook>> {
        match self {
            Self::SubscribeHook(h) | Self::UnsubscribeHook(h) | Self::LogLevelHook(h) => Some(h),
            _ => None,
        }
    }
}

struct Registration {
    name: String,
    capability: Capability,
}

/// Registry of capabilities, keyed by kind and name.
///
/// Entries keep registration order, which is also listing order.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: HashMap<CapabilityKind, Vec<Registration>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` under `name`. Names are unique per kind.
    pub fn register(&mut self, name: impl Into<String>, capability: Capability) -> Result<()> {
        let name = name.into();
        let kind = capability.kind();
        let slot = self.entries.entry(kind).or_default();
        if slot.iter().any(|r| r.name == name) {
            return Err(Error::duplicate(kind, name));
        }
        debug!("Registered {} '{}'", kind, name);
        slot.push(Registration { name, capability });
        Ok(())
    }

    /// Register a tool under the name its definition declares.
    pub fn register_tool<T: ToolHandler + 'static>(&mut self, handler: T) -> Result<()> {
        let name = handler.definition().name;
        self.register(name, Capability::Tool(Arc::new(handler)))
    }

    /// Register a prompt under the name its definition declares.
    pub fn register_prompt<P: PromptHandler + 'static>(&mut self, handler: P) -> Result<()> {
        let name = handler.definition().name;
        self.register(name, Capability::PromptProvider(Arc::new(handler)))
    }

    /// Register a completion table for one reference.
    pub fn register_completion(
        &mut self,
        reference: &CompletionReference,
        handler: Arc<dyn CompletionHandler>,
    ) -> Result<()> {
        self.register(reference.key(), Capability::CompletionProvider(handler))
    }

    /// Resolve a capability by kind and name.
    pub fn lookup(&self, kind: CapabilityKind, name: &str) -> Result<&Capability> {
        self.entries
            .get(&kind)
            .and_then(|slot| slot.iter().find(|r| r.name == name))
            .map(|r| &r.capability)
            .ok_or_else(|| Error::unknown(kind, name))
    }

    fn iter_kind(&self, kind: CapabilityKind) -> impl Iterator<Item = &Capability> {
        self.entries
            .get(&kind)
            .into_iter()
            .flat_map(|slot| slot.iter().map(|r| &r.capability))
    }

    /// Number of capabilities registered under `kind`.
    pub fn count(&self, kind: CapabilityKind) -> usize {
        self.entries.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        self.iter_kind(CapabilityKind::Tool)
            .filter_map(|c| match c {
                Capability::Tool(t) => Some(t.definition()),
                _ => None,
            })
            .collect()
    }

    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.iter_kind(CapabilityKind::PromptProvider)
            .filter_map(|c| match c {
                Capability::PromptProvider(p) => Some(p.definition()),
                _ => None,
            })
            .collect()
    }

    /// Run the named tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let tool = match self.lookup(CapabilityKind::Tool, name)? {
            Capability::Tool(t) => t.clone(),
            _ => return Err(Error::unknown(CapabilityKind::Tool, name)),
        };
        ctx.outbound.metrics().inc_tool_calls();
        tool.execute(arguments, ctx).await
    }

    /// Render the named prompt.
    pub fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        match self.lookup(CapabilityKind::PromptProvider, name)? {
            Capability::PromptProvider(p) => p.render(arguments),
            _ => Err(Error::unknown(CapabilityKind::PromptProvider, name)),
        }
    }

    /// Complete an argument of the referenced prompt or template.
    pub fn complete(
        &self,
        reference: &CompletionReference,
        argument: &CompletionArgument,
    ) -> Result<Completion> {
        let key = reference.key();
        match self.lookup(CapabilityKind::CompletionProvider, &key)? {
            Capability::CompletionProvider(c) => c.complete(argument),
            _ => Err(Error::unknown(CapabilityKind::CompletionProvider, key)),
        }
    }

    /// The first registered resource provider.
    pub fn resources(&self) -> Result<&ResourceCatalog> {
        self.iter_kind(CapabilityKind::ResourceProvider)
            .find_map(|c| match c {
                Capability::ResourceProvider(r) => Some(r.as_ref()),
                _ => None,
            })
            .ok_or_else(|| Error::unknown(CapabilityKind::ResourceProvider, "*"))
    }

    /// Run every hook of `kind` in registration order. Hook failures are
    /// logged and do not stop the remaining hooks.
    pub async fn run_hooks(&self, kind: CapabilityKind, value: &str) {
        let hooks: Vec<Arc<dyn SessionHook>> =
            self.iter_kind(kind).filter_map(|c| c.hook().cloned()).collect();
        for hook in hooks {
            if let Err(e) = hook.on_event(value).await {
                warn!("{} failed for '{}': {}", kind, value, e);
            }
        }
    }
}

/// Helper macro for creating tool input schemas.
#[macro_export]
macro_rules! tool_schema {
    (required: [$($req:expr),* $(,)?], $($json:tt)+) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $($json)+
            },
            "required": [$($req),*]
        })
    };
    ($($json:tt)*) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $($json)*
            }
        })
    };
}

/// Helper to create a text content block.
pub fn text_content(text: impl Into<String>) -> ContentBlock {
    ContentBlock::text(text)
}

/// Helper to create a successful tool result.
pub fn success_result(text: impl Into<String>) -> ToolResult {
    ToolResult {
        content: vec![text_content(text)],
        is_error: false,
    }
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &HashMap<String, Value>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| Error::InvalidToolArguments(format!("Missing required argument: {}", name)))
}

/// Helper to extract an optional number argument with a default.
pub fn get_number_arg_or(args: &HashMap<String, Value>, name: &str, default: f64) -> f64 {
    args.get(name).and_then(|v| v.as_f64()).unwrap_or(default)
}

/// Helper to extract a boolean argument with a default.
pub fn get_bool_arg(args: &HashMap<String, Value>, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}
