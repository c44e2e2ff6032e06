//! Wire types shared across the chat client: OpenAI-format chat messages
//! and tool schemas on the model side, MCP tool structures on the server
//! side.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============ Chat messages ============

/// One entry in the conversation history. History is append-only within a
/// query; entries are never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Native tool call as it appears inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAIToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCallFunction {
    pub name: String,
    /// JSON-encoded argument object, as the chat API transmits it.
    pub arguments: String,
}

// ============ Tool schemas advertised to the model ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAITool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl OpenAITool {
    /// Translate a discovered MCP tool into the model's function-calling
    /// schema. Name, description, and parameter schema carry through
    /// unchanged.
    pub fn from_mcp(tool: &McpTool) -> Self {
        OpenAITool {
            tool_type: "function".to_string(),
            function: OpenAIFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            },
        }
    }
}

// ============ MCP structures ============

/// MCP tool definition from a tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", alias = "input_schema", default)]
    pub input_schema: Option<Value>,
}

/// Result from tool execution. Failures arrive as data (`is_error`), never
/// as faults across the session boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl McpToolResult {
    /// Flatten the text parts of the result into one string.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

// ============ Decoded tool call requests ============

/// A tool call requested by the model, decoded for dispatch. Consumed
/// exactly once by the conversation loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    /// Correlation identifier supplied by the model.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mcp_carries_schema_through_unchanged() {
        let schema = json!({
            "type": "object",
            "properties": {"column_name": {"type": "string"}},
            "required": ["column_name"]
        });
        let tool = McpTool {
            name: "describe_column".to_string(),
            description: Some("Describe a column".to_string()),
            input_schema: Some(schema.clone()),
        };
        let translated = OpenAITool::from_mcp(&tool);
        assert_eq!(translated.tool_type, "function");
        assert_eq!(translated.function.name, "describe_column");
        assert_eq!(translated.function.parameters, schema);
    }

    #[test]
    fn from_mcp_defaults_missing_schema_to_empty_object() {
        let tool = McpTool {
            name: "get_column_names".to_string(),
            description: None,
            input_schema: None,
        };
        let translated = OpenAITool::from_mcp(&tool);
        assert_eq!(translated.function.parameters["type"], "object");
    }

    #[test]
    fn tool_result_text_joins_text_parts() {
        let result = McpToolResult {
            content: vec![
                McpContent {
                    content_type: "text".to_string(),
                    text: Some("line one".to_string()),
                },
                McpContent {
                    content_type: "text".to_string(),
                    text: Some("line two".to_string()),
                },
            ],
            is_error: false,
        };
        assert_eq!(result.text(), "line one\nline two");
    }

    #[test]
    fn chat_message_serializes_without_empty_options() {
        let msg = ChatMessage::user("hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert!(value.get("tool_calls").is_none());
        assert!(value.get("tool_call_id").is_none());
    }
}
