//! Stateless demo tools: echo, add and printEnv.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::mcp::handler::{get_string_arg, success_result, ToolContext, ToolHandler};
use crate::mcp::protocol::{Tool, ToolResult};
use crate::tool_schema;

/// Echo tool.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "echo".to_string(),
            description: "Echoes back the input".to_string(),
            input_schema: tool_schema! {
                required: ["message"],
                "message": {
                    "type": "string",
                    "description": "Message to echo"
                }
            },
        }
    }

    async fn execute(&self, args: HashMap<String, Value>, _ctx: &ToolContext) -> Result<ToolResult> {
        let message = get_string_arg(&args, "message")?;
        Ok(success_result(format!("Echo: {}", message)))
    }
}

/// A numeric argument, kept integral when the peer sent an integer.
#[derive(Debug, Clone, Copy)]
enum Operand {
    Int(i64),
    Float(f64),
}

impl Operand {
    fn from_args(args: &HashMap<String, Value>, name: &str) -> Result<Self> {
        let value = args.get(name).ok_or_else(|| {
            Error::InvalidToolArguments(format!("Missing required argument: {}", name))
        })?;
        if let Some(n) = value.as_i64() {
            return Ok(Self::Int(n));
        }
        value.as_f64().map(Self::Float).ok_or_else(|| {
            Error::InvalidToolArguments(format!("Argument '{}' must be a number", name))
        })
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(x) => x,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map(Self::Int)
                .unwrap_or(Self::Float(a as f64 + b as f64)),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
        }
    }
}

/// Add tool.
pub struct AddTool;

#[async_trait]
impl ToolHandler for AddTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "add".to_string(),
            description: "Adds two numbers".to_string(),
            input_schema: tool_schema! {
                required: ["a", "b"],
                "a": { "type": "number", "description": "First number" },
                "b": { "type": "number", "description": "Second number" }
            },
        }
    }

    async fn execute(&self, args: HashMap<String, Value>, _ctx: &ToolContext) -> Result<ToolResult> {
        let a = Operand::from_args(&args, "a")?;
        let b = Operand::from_args(&args, "b")?;
        Ok(success_result(format!(
            "The sum of {} and {} is {}.",
            a,
            b,
            a.add(b)
        )))
    }
}

/// Print environment tool.
pub struct PrintEnvTool;

#[async_trait]
impl ToolHandler for PrintEnvTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "printEnv".to_string(),
            description: "Prints all environment variables, helpful for debugging MCP server configuration"
                .to_string(),
            input_schema: tool_schema! {},
        }
    }

    async fn execute(&self, _args: HashMap<String, Value>, _ctx: &ToolContext) -> Result<ToolResult> {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        Ok(success_result(serde_json::to_string_pretty(&env)?))
    }
}
