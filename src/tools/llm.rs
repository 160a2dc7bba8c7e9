//! Tool that asks the peer to generate text mid-invocation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mcp::handler::{get_string_arg, success_result, ToolContext, ToolHandler};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::mcp::sampling::{CreateMessageParams, SamplingMessage};
use crate::tool_schema;

const DEFAULT_MAX_TOKENS: u32 = 100;

/// sampleLLM tool.
pub struct SampleLlmTool;

#[async_trait]
impl ToolHandler for SampleLlmTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "sampleLLM".to_string(),
            description: "Samples from an LLM using MCP's sampling feature".to_string(),
            input_schema: tool_schema! {
                required: ["prompt"],
                "prompt": {
                    "type": "string",
                    "description": "The prompt to send to the LLM"
                },
                "maxTokens": {
                    "type": "number",
                    "default": DEFAULT_MAX_TOKENS,
                    "description": "Maximum number of tokens to generate"
                }
            },
        }
    }

    async fn execute(&self, args: HashMap<String, Value>, ctx: &ToolContext) -> Result<ToolResult> {
        let prompt = get_string_arg(&args, "prompt")?;
        let max_tokens = match args.get("maxTokens") {
            None => DEFAULT_MAX_TOKENS,
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    Error::InvalidToolArguments("maxTokens must be a positive integer".to_string())
                })?,
        };

        let params = CreateMessageParams {
            messages: vec![SamplingMessage::user_text(prompt)],
            max_tokens,
            system_prompt: None,
        };
        let text = ctx.sampling.sample_text(&ctx.outbound, &params).await;
        Ok(success_result(format!("LLM sampling result: {}", text)))
    }
}
