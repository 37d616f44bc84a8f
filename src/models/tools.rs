//! Tool definitions accepted on the inbound wire.
//!
//! Clients send tools in more than one dialect: the Anthropic shape
//! (`{name, description, input_schema}`), the OpenAI function shape
//! (`{function: {name, …}}`), and a custom-tool shape (`{custom: {name}}`).
//! [`Tool::canonical_name`] resolves a usable name across all of them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Tool {
    /// Tool name (Anthropic shape).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable description, copied through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the tool input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// OpenAI-style nested function definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Value>,

    /// Custom-tool nested definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl Tool {
    /// Create a tool in the Anthropic shape.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: Some(name.into()),
            description: Some(description.into()),
            input_schema: Some(input_schema),
            function: None,
            custom: None,
        }
    }

    /// Resolve the canonical tool name.
    ///
    /// Checks, in order: top-level `name`, `function.name`, `custom.name`;
    /// falls back to `tool-<index>`.
    pub fn canonical_name(&self, index: usize) -> String {
        if let Some(name) = self.name.as_ref().filter(|n| !n.is_empty()) {
            return name.clone();
        }
        for nested in [&self.function, &self.custom] {
            if let Some(name) = nested
                .as_ref()
                .and_then(|v| v.get("name"))
                .and_then(|v| v.as_str())
                .filter(|n| !n.is_empty())
            {
                return name.to_string();
            }
        }
        format!("tool-{index}")
    }

    /// Resolve the input schema, looking into nested shapes when the
    /// top-level field is absent.
    pub fn schema(&self) -> Option<&Value> {
        self.input_schema.as_ref().or_else(|| {
            self.function
                .as_ref()
                .and_then(|f| f.get("parameters").or_else(|| f.get("input_schema")))
        })
    }
}

/// How the model should choose tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides.
    Auto,
    /// Model must use some tool.
    Any,
    /// Model must not use tools.
    None,
    /// Model must use the named tool.
    Tool {
        /// Name of the required tool.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_name_top_level() {
        let tool = Tool::new("read_file", "Reads a file", json!({"type": "object"}));
        assert_eq!(tool.canonical_name(0), "read_file");
    }

    #[test]
    fn test_canonical_name_function_shape() {
        let tool: Tool = serde_json::from_value(json!({
            "function": {"name": "search", "parameters": {"type": "object"}}
        }))
        .unwrap();
        assert_eq!(tool.canonical_name(0), "search");
        assert!(tool.schema().is_some());
    }

    #[test]
    fn test_canonical_name_custom_shape() {
        let tool: Tool = serde_json::from_value(json!({
            "custom": {"name": "my_custom"}
        }))
        .unwrap();
        assert_eq!(tool.canonical_name(2), "my_custom");
    }

    #[test]
    fn test_canonical_name_fallback() {
        let tool = Tool::default();
        assert_eq!(tool.canonical_name(3), "tool-3");
    }

    #[test]
    fn test_empty_name_falls_through() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "",
            "function": {"name": "real_name"}
        }))
        .unwrap();
        assert_eq!(tool.canonical_name(0), "real_name");
    }

    #[test]
    fn test_tool_choice_deserialization() {
        let auto: ToolChoice = serde_json::from_value(json!({"type": "auto"})).unwrap();
        assert_eq!(auto, ToolChoice::Auto);

        let named: ToolChoice =
            serde_json::from_value(json!({"type": "tool", "name": "search"})).unwrap();
        assert_eq!(
            named,
            ToolChoice::Tool {
                name: "search".into()
            }
        );
    }
}
