//! MCP Prompt Templates
//!
//! The demo prompts served by `prompts/list` and `prompts/get`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mcp::handler::PromptHandler;
use crate::mcp::protocol::{ContentBlock, Role};

/// A 1x1 PNG, base64 encoded.
pub const MCP_TINY_IMAGE: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// A prompt argument definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArgument {
    fn new(name: &str, description: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required,
        }
    }
}

/// A prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: ContentBlock,
}

impl PromptMessage {
    pub fn new(role: Role, content: ContentBlock) -> Self {
        Self { role, content }
    }
}

/// Result of prompts/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of prompts/get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// Params of prompts/get.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPromptParams {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Reject the call if any required argument is absent.
fn check_required(prompt: &Prompt, arguments: &HashMap<String, String>) -> Result<()> {
    match prompt
        .arguments
        .iter()
        .find(|a| a.required && !arguments.contains_key(&a.name))
    {
        Some(missing) => Err(Error::InvalidParams(format!(
            "Missing required argument '{}' for prompt '{}'",
            missing.name, prompt.name
        ))),
        None => Ok(()),
    }
}

/// `simple_prompt`: one fixed user message.
pub struct SimplePrompt;

impl PromptHandler for SimplePrompt {
    fn definition(&self) -> Prompt {
        Prompt {
            name: "simple_prompt".to_string(),
            description: "A prompt without arguments".to_string(),
            arguments: Vec::new(),
        }
    }

    fn render(&self, _arguments: &HashMap<String, String>) -> Result<GetPromptResult> {
        Ok(GetPromptResult {
            description: None,
            messages: vec![PromptMessage::new(
                Role::User,
                ContentBlock::text("This is a simple prompt without arguments."),
            )],
        })
    }
}

/// `complex_prompt`: echoes its arguments back, then an assistant turn and
/// an image.
pub struct ComplexPrompt;

impl PromptHandler for ComplexPrompt {
    fn definition(&self) -> Prompt {
        Prompt {
            name: "complex_prompt".to_string(),
            description: "A prompt with arguments".to_string(),
            arguments: vec![
                PromptArgument::new("temperature", "Temperature setting", true),
                PromptArgument::new("style", "Output style", false),
            ],
        }
    }

    fn render(&self, arguments: &HashMap<String, String>) -> Result<GetPromptResult> {
        check_required(&self.definition(), arguments)?;

        let temperature = arguments.get("temperature").map(String::as_str).unwrap_or("none");
        let style = arguments.get("style").map(String::as_str).unwrap_or("none");

        Ok(GetPromptResult {
            description: None,
            messages: vec![
                PromptMessage::new(
                    Role::User,
                    ContentBlock::text(format!(
                        "This is a complex prompt with arguments: temperature={}, style={}",
                        temperature, style
                    )),
                ),
                PromptMessage::new(
                    Role::Assistant,
                    ContentBlock::text(
                        "I understand. You've provided a complex prompt with temperature and \
                         style arguments. How would you like me to proceed?",
                    ),
                ),
                PromptMessage::new(Role::User, ContentBlock::image(MCP_TINY_IMAGE, "image/png")),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_prompt() {
        let result = SimplePrompt.render(&HashMap::new()).unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::User);
        assert_eq!(
            result.messages[0].content.as_text(),
            Some("This is a simple prompt without arguments.")
        );
    }

    #[test]
    fn test_complex_prompt_messages() {
        let mut args = HashMap::new();
        args.insert("temperature".to_string(), "0.7".to_string());
        args.insert("style".to_string(), "formal".to_string());

        let result = ComplexPrompt.render(&args).unwrap();
        let roles: Vec<Role> = result.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(
            result.messages[0].content.as_text(),
            Some("This is a complex prompt with arguments: temperature=0.7, style=formal")
        );
        assert_eq!(
            result.messages[2].content,
            ContentBlock::image(MCP_TINY_IMAGE, "image/png")
        );
    }

    #[test]
    fn test_complex_prompt_requires_temperature() {
        let mut args = HashMap::new();
        args.insert("style".to_string(), "casual".to_string());

        let err = ComplexPrompt.render(&args).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));

        args.clear();
        args.insert("temperature".to_string(), "1.0".to_string());
        let result = ComplexPrompt.render(&args).unwrap();
        assert_eq!(
            result.messages[0].content.as_text(),
            Some("This is a complex prompt with arguments: temperature=1.0, style=none")
        );
    }

    #[test]
    fn test_prompt_definition_serialization() {
        let value = serde_json::to_value(ComplexPrompt.definition()).unwrap();
        assert_eq!(value["name"], "complex_prompt");
        assert_eq!(
            value["arguments"][0],
            json!({"name": "temperature", "description": "Temperature setting", "required": true})
        );
        assert_eq!(value["arguments"][1]["required"], json!(false));
    }
}
