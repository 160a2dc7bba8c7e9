//! MCP tool implementations.
//!
//! - `basic` - echo, add, printEnv
//! - `long_running` - longRunningOperation (progress notifications)
//! - `llm` - sampleLLM (nested sampling request)
//! - `content` - getTinyImage, annotatedMessage

pub mod basic;
pub mod content;
pub mod llm;
pub mod long_running;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::mcp::completion::{CompletionReference, ExampleCompletions};
use crate::mcp::handler::{Capability, CapabilityRegistry};
use crate::mcp::prompts::{ComplexPrompt, SimplePrompt};
use crate::mcp::resources::ResourceCatalog;

/// Register all tools with the registry.
pub fn register_all_tools(registry: &mut CapabilityRegistry, config: &Config) -> Result<()> {
    registry.register_tool(basic::EchoTool)?;
    registry.register_tool(basic::AddTool)?;
    registry.register_tool(long_running::LongRunningOperationTool::new(
        config.long_running_duration,
        config.long_running_steps,
    ))?;
    registry.register_tool(basic::PrintEnvTool)?;
    registry.register_tool(llm::SampleLlmTool)?;
    registry.register_tool(content::TinyImageTool)?;
    registry.register_tool(content::AnnotatedMessageTool)?;
    Ok(())
}

/// Build the registry the binary serves: demo tools, the static resource
/// catalog, both prompts and their completion tables.
pub fn default_registry(config: &Config) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    register_all_tools(&mut registry, config)?;

    let catalog = ResourceCatalog::with_static_resources(config.page_size)?;
    let template_refs: Vec<CompletionReference> = catalog
        .templates()
        .iter()
        .map(|t| CompletionReference::Resource {
            uri: t.template.pattern().to_string(),
        })
        .collect();
    registry.register("static", Capability::ResourceProvider(Arc::new(catalog)))?;

    registry.register_prompt(SimplePrompt)?;
    registry.register_prompt(ComplexPrompt)?;

    let completions = Arc::new(ExampleCompletions::new());
    registry.register_completion(
        &CompletionReference::Prompt {
            name: "complex_prompt".to_string(),
        },
        completions.clone(),
    )?;
    for reference in &template_refs {
        registry.register_completion(reference, completions.clone())?;
    }

    Ok(registry)
}

#[cfg(test)]
pub(crate) fn test_context() -> (
    crate::mcp::handler::ToolContext,
    tokio::sync::mpsc::Receiver<crate::mcp::transport::Message>,
) {
    use crate::mcp::progress::{ProgressReporter, ProgressToken};
    use crate::mcp::sampling::SamplingBridge;
    use crate::mcp::transport::Outbound;
    use crate::metrics::Metrics;
    use std::time::Duration;

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let outbound = Outbound::new(tx, Metrics::new());
    let ctx = crate::mcp::handler::ToolContext {
        progress: ProgressReporter::new(ProgressToken::String("test".to_string()), outbound.clone()),
        sampling: Arc::new(SamplingBridge::new(Duration::from_secs(5))),
        outbound,
    };
    (ctx, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::handler::CapabilityKind;

    #[test]
    fn test_default_registry_contents() {
        let registry = default_registry(&Config::default()).unwrap();

        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "echo",
                "add",
                "longRunningOperation",
                "printEnv",
                "sampleLLM",
                "getTinyImage",
                "annotatedMessage"
            ]
        );
        assert_eq!(registry.count(CapabilityKind::PromptProvider), 2);
        assert_eq!(registry.count(CapabilityKind::CompletionProvider), 2);
        assert_eq!(registry.resources().unwrap().len(), 7);
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut registry = CapabilityRegistry::new();
        register_all_tools(&mut registry, &Config::default()).unwrap();
        assert!(register_all_tools(&mut registry, &Config::default()).is_err());
    }
}
