//! Long-running operation with progress reporting.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mcp::handler::{get_number_arg_or, success_result, ToolContext, ToolHandler};
use crate::mcp::protocol::{Tool, ToolResult};

/// Sleeps `duration / steps` seconds per step and reports progress after
/// each one.
pub struct LongRunningOperationTool {
    default_duration: f64,
    default_steps: u64,
}

impl LongRunningOperationTool {
    pub fn new(default_duration: f64, default_steps: u64) -> Self {
        Self {
            default_duration,
            default_steps,
        }
    }
}

impl Default for LongRunningOperationTool {
    fn default() -> Self {
        Self::new(10.0, 5)
    }
}

#[async_trait]
impl ToolHandler for LongRunningOperationTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "longRunningOperation".to_string(),
            description: "Demonstrates a long running operation with progress updates".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "duration": {
                        "type": "number",
                        "default": self.default_duration,
                        "description": "Duration of the operation in seconds"
                    },
                    "steps": {
                        "type": "number",
                        "default": self.default_steps,
                        "description": "Number of steps in the operation"
                    }
                }
            }),
        }
    }

    async fn execute(&self, args: HashMap<String, Value>, ctx: &ToolContext) -> Result<ToolResult> {
        let duration = get_number_arg_or(&args, "duration", self.default_duration);
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(Error::InvalidToolArguments(
                "duration must be a non-negative number".to_string(),
            ));
        }

        let steps = match args.get("steps") {
            None => self.default_steps,
            Some(v) => v.as_u64().filter(|s| *s > 0).ok_or_else(|| {
                Error::InvalidToolArguments("steps must be a positive integer".to_string())
            })?,
        };

        let step_duration = Duration::try_from_secs_f64(duration / steps as f64).map_err(|_| {
            Error::InvalidToolArguments(format!("duration {} is out of range", duration))
        })?;
        for step in 1..=steps {
            tokio::time::sleep(step_duration).await;
            debug!("Long running operation: step {}/{}", step, steps);
            ctx.progress.report(step, steps).await;
        }

        Ok(success_result(format!(
            "Long running operation completed. Duration: {} seconds, Steps: {}.",
            duration, steps
        )))
    }
}
