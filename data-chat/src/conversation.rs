//! The model/tool conversation loop.
//!
//! Drives one query to completion: call the model, dispatch whatever tool
//! calls it requests, fold the results back into the history, and resubmit
//! until the model stops. Tool failures are data in the history, not loop
//! failures; only transport/model faults and the turn ceiling abort.

use crate::error::ChatError;
use crate::message_builders::{assistant_tool_call_message, tool_result_message};
use crate::model::{ChatModel, FinishSignal};
use crate::protocol::{ChatMessage, OpenAITool};
use crate::session::ToolInvoker;

pub const DEFAULT_MAX_TURNS: usize = 16;

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Ceiling on model calls per query. Hitting it fails the query with
    /// a turn-limit error instead of looping forever.
    pub max_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        ConversationConfig {
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// Run one user query to completion.
///
/// Returns the assembled transcript: tool-call markers, tool responses,
/// and the model's final text, in the order they occurred.
pub async fn run_query<M: ChatModel + ?Sized, T: ToolInvoker + ?Sized>(
    model: &M,
    invoker: &T,
    tool_schemas: &[OpenAITool],
    query: &str,
    config: &ConversationConfig,
) -> Result<String, ChatError> {
    let mut history = vec![ChatMessage::user(query)];
    let mut transcript: Vec<String> = Vec::new();

    for _turn in 0..config.max_turns {
        let turn = model.complete(&history, tool_schemas).await?;

        match turn.finish {
            FinishSignal::Stop => {
                transcript.push(turn.content);
                return Ok(transcript.join("\n"));
            }
            FinishSignal::ToolCalls => {
                // The assistant message must precede its tool results in
                // the history or the API rejects the resubmission.
                history.push(assistant_tool_call_message(&turn.content, &turn.tool_calls));

                for call in &turn.tool_calls {
                    transcript.push(format!(
                        "[Calling tool {} with args {}]",
                        call.name, call.arguments
                    ));

                    let result_text = match invoker.invoke_tool(&call.name, call.arguments.clone()).await
                    {
                        Ok(result) => result.text(),
                        // Session-level faults still fold into the history;
                        // the model decides whether to retry or give up.
                        Err(e) => format!("Tool invocation failed: {}", e),
                    };

                    transcript.push(format!("[Tool response: {}]", result_text));
                    history.push(tool_result_message(&call.id, &result_text));
                }
            }
            FinishSignal::Other(reason) => {
                return Err(ChatError::UnexpectedFinish(reason));
            }
        }
    }

    Err(ChatError::TurnLimitExceeded(config.max_turns))
}
