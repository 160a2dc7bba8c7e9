//! Tools returning rich content: images and annotated blocks.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::mcp::handler::{get_bool_arg, get_string_arg, ToolContext, ToolHandler};
use crate::mcp::prompts::MCP_TINY_IMAGE;
use crate::mcp::protocol::{Annotations, ContentBlock, Role, Tool, ToolResult};
use crate::tool_schema;

/// getTinyImage tool.
pub struct TinyImageTool;

#[async_trait]
impl ToolHandler for TinyImageTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "getTinyImage".to_string(),
            description: "Returns the MCP_TINY_IMAGE".to_string(),
            input_schema: tool_schema! {},
        }
    }

    async fn execute(&self, _args: HashMap<String, Value>, _ctx: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult {
            content: vec![
                ContentBlock::text("This is a tiny image:"),
                ContentBlock::image(MCP_TINY_IMAGE, "image/png"),
                ContentBlock::text("The image above is the MCP tiny image."),
            ],
            is_error: false,
        })
    }
}

/// annotatedMessage tool.
pub struct AnnotatedMessageTool;

fn annotated_text(message_type: &str) -> ContentBlock {
    let (text, annotations) = match message_type {
        "error" => (
            "Error: Operation failed".to_string(),
            Annotations::new(1.0, &[Role::User, Role::Assistant]),
        ),
        "success" => (
            "Operation completed successfully".to_string(),
            Annotations::new(0.7, &[Role::User]),
        ),
        "debug" => (
            "Debug: Cache hit ratio 0.95, latency 150ms".to_string(),
            Annotations::new(0.3, &[Role::Assistant]),
        ),
        other => (
            format!("Unknown message type: {}", other),
            Annotations::new(0.5, &[Role::User, Role::Assistant]),
        ),
    };
    ContentBlock::text(text).with_annotations(annotations)
}

#[async_trait]
impl ToolHandler for AnnotatedMessageTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "annotatedMessage".to_string(),
            description: "Demonstrates how annotations can be used to provide metadata about content"
                .to_string(),
            input_schema: tool_schema! {
                required: ["messageType"],
                "messageType": {
                    "type": "string",
                    "enum": ["error", "success", "debug"],
                    "description": "Type of message to demonstrate different annotation patterns"
                },
                "includeImage": {
                    "type": "boolean",
                    "default": false,
                    "description": "Whether to include an example image"
                }
            },
        }
    }

    async fn execute(&self, args: HashMap<String, Value>, _ctx: &ToolContext) -> Result<ToolResult> {
        let message_type = get_string_arg(&args, "messageType")?;
        let mut content = vec![annotated_text(&message_type)];

        if get_bool_arg(&args, "includeImage", false) {
            content.push(
                ContentBlock::image(MCP_TINY_IMAGE, "image/png")
                    .with_annotations(Annotations::new(0.5, &[Role::User])),
            );
        }

        Ok(ToolResult {
            content,
            is_error: false,
        })
    }
}
