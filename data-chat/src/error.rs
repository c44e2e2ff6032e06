//! Client-side error taxonomy.
//!
//! These are the failures that abort a query or a session. Tool-level
//! validation failures (missing dataset, bad arguments) are NOT here: they
//! arrive as `isError` tool results and are folded into the conversation
//! for the model to react to.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The server locator does not name something we know how to run.
    /// Raised before any process is spawned.
    #[error("unsupported server target {0:?}: expected a .py or .js script, or an executable")]
    UnsupportedTarget(PathBuf),

    /// Spawn, handshake, or discovery failed. Fatal to the session; retry
    /// policy belongs to the caller.
    #[error("failed to connect to MCP server: {0}")]
    Connection(String),

    /// The channel broke mid-session (EOF, write failure, timeout).
    #[error("MCP transport failure: {0}")]
    Transport(String),

    /// The completion HTTP call failed.
    #[error("model request failed: {0}")]
    Model(String),

    /// The completion response could not be interpreted.
    #[error("model response could not be decoded: {0}")]
    Decode(String),

    /// The model signalled neither a stop nor a tool call. Terminating with
    /// a diagnostic beats spinning on an answer that will never come.
    #[error("model finished with unexpected reason `{0}`")]
    UnexpectedFinish(String),

    /// The per-query turn ceiling was hit without a final answer.
    #[error("turn limit of {0} exceeded without a final answer")]
    TurnLimitExceeded(usize),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Model(err.to_string())
    }
}
