//! Message construction for the conversation loop.
//!
//! Builds assistant messages carrying native tool calls and the matching
//! tool-result messages, in the format the chat completion API expects.

use crate::protocol::{ChatMessage, OpenAIToolCall, OpenAIToolCallFunction, ParsedToolCall};

/// Create an assistant message describing the tool calls the model just
/// requested, preserving their emission order.
pub fn assistant_tool_call_message(content: &str, calls: &[ParsedToolCall]) -> ChatMessage {
    let tool_calls: Vec<OpenAIToolCall> = calls
        .iter()
        .map(|call| OpenAIToolCall {
            id: call.id.clone(),
            call_type: "function".to_string(),
            function: OpenAIToolCallFunction {
                name: call.name.clone(),
                arguments: serde_json::to_string(&call.arguments).unwrap_or_default(),
            },
        })
        .collect();

    ChatMessage {
        role: "assistant".to_string(),
        content: content.to_string(),
        tool_calls: Some(tool_calls),
        tool_call_id: None,
    }
}

/// Create a tool-result message. The `tool_call_id` associates the result
/// with the call that produced it.
pub fn tool_result_message(tool_call_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        role: "tool".to_string(),
        content: content.to_string(),
        tool_calls: None,
        tool_call_id: Some(tool_call_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_message_carries_calls_in_order() {
        let calls = vec![
            ParsedToolCall {
                id: "call_1".to_string(),
                name: "load_data".to_string(),
                arguments: json!({"file_name": "titanic"}),
            },
            ParsedToolCall {
                id: "call_2".to_string(),
                name: "get_column_names".to_string(),
                arguments: json!({}),
            },
        ];

        let msg = assistant_tool_call_message("", &calls);
        assert_eq!(msg.role, "assistant");
        let tool_calls = msg.tool_calls.unwrap();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0].id, "call_1");
        assert_eq!(tool_calls[0].function.name, "load_data");
        assert_eq!(tool_calls[1].id, "call_2");
        assert_eq!(
            tool_calls[0].function.arguments,
            r#"{"file_name":"titanic"}"#
        );
    }

    #[test]
    fn tool_result_message_links_back_to_call() {
        let msg = tool_result_message("call_1", "{\"success\":true}");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.tool_calls.is_none());
    }
}
