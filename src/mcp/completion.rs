//! Argument completion for prompts and resource templates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::mcp::handler::CompletionHandler;

/// Most values returned in one completion response.
pub const MAX_COMPLETION_VALUES: usize = 100;

/// What is being completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    #[serde(rename = "ref/prompt")]
    Prompt { name: String },
    #[serde(rename = "ref/resource")]
    Resource { uri: String },
}

impl CompletionReference {
    /// Registry key for this reference.
    pub fn key(&self) -> String {
        match self {
            Self::Prompt { name } => format!("ref/prompt:{}", name),
            Self::Resource { uri } => format!("ref/resource:{}", uri),
        }
    }
}

/// The argument being completed and its partial value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArgument {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Params of completion/complete.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteParams {
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    pub argument: CompletionArgument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub values: Vec<String>,
    pub total: usize,
    pub has_more: bool,
}

impl Completion {
    /// Truncate `matches` to [`MAX_COMPLETION_VALUES`], keeping the full count.
    pub fn from_matches(mut matches: Vec<String>) -> Self {
        let total = matches.len();
        let has_more = total > MAX_COMPLETION_VALUES;
        matches.truncate(MAX_COMPLETION_VALUES);
        Self {
            values: matches,
            total,
            has_more,
        }
    }
}

/// Result of completion/complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: Completion,
}

/// Static candidate table, matched by case-insensitive prefix.
#[derive(Debug, Clone, Default)]
pub struct ExampleCompletions {
    candidates: HashMap<String, Vec<String>>,
}

impl ExampleCompletions {
    /// Candidates for `style`, `temperature` and `resourceId`.
    pub fn new() -> Self {
        let mut table = Self::default();
        table.insert("style", &["casual", "formal", "technical", "friendly"]);
        table.insert("temperature", &["0", "0.5", "0.7", "1.0"]);
        table.insert("resourceId", &["1", "2", "3", "4", "5"]);
        // Template placeholder spelling.
        table.insert("resource_id", &["1", "2", "3", "4", "5"]);
        table
    }

    pub fn insert(&mut self, argument: &str, values: &[&str]) {
        self.candidates.insert(
            argument.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }
}

impl CompletionHandler for ExampleCompletions {
    fn complete(&self, argument: &CompletionArgument) -> Result<Completion> {
        let prefix = argument.value.to_lowercase();
        let matches = self
            .candidates
            .get(&argument.name)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| v.to_lowercase().starts_with(&prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(Completion::from_matches(matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arg(name: &str, value: &str) -> CompletionArgument {
        CompletionArgument {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_style_prefix() {
        let completion = ExampleCompletions::new().complete(&arg("style", "f")).unwrap();
        assert_eq!(completion.values, vec!["formal", "friendly"]);
        assert_eq!(completion.total, 2);
        assert!(!completion.has_more);
    }

    #[test]
    fn test_case_insensitive() {
        let completions = ExampleCompletions::new();
        assert_eq!(
            completions.complete(&arg("style", "TECH")).unwrap().values,
            vec!["technical"]
        );
        assert_eq!(completions.complete(&arg("temperature", "")).unwrap().total, 4);
        assert_eq!(
            completions.complete(&arg("temperature", "0.")).unwrap().values,
            vec!["0.5", "0.7"]
        );
    }

    #[test]
    fn test_unknown_argument_is_empty() {
        let completion = ExampleCompletions::new().complete(&arg("colour", "r")).unwrap();
        assert!(completion.values.is_empty());
        assert_eq!(completion.total, 0);
    }

    #[test]
    fn test_truncation() {
        let many: Vec<String> = (0..150).map(|i| format!("v{}", i)).collect();
        let completion = Completion::from_matches(many);
        assert_eq!(completion.values.len(), MAX_COMPLETION_VALUES);
        assert_eq!(completion.total, 150);
        assert!(completion.has_more);
    }

    #[test]
    fn test_params_deserialization() {
        let params: CompleteParams = serde_json::from_value(json!({
            "ref": {"type": "ref/resource", "uri": "test://static/resource/{resource_id}"},
            "argument": {"name": "resource_id", "value": "3"}
        }))
        .unwrap();
        assert_eq!(
            params.reference.key(),
            "ref/resource:test://static/resource/{resource_id}"
        );

        let result = serde_json::to_value(CompleteResult {
            completion: Completion::from_matches(vec!["3".to_string()]),
        })
        .unwrap();
        assert_eq!(
            result,
            json!({"completion": {"values": ["3"], "total": 1, "hasMore": false}})
        );
    }
}
