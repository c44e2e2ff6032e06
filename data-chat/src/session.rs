//! MCP session management over a spawned stdio server process.
//!
//! `McpSession::connect` resolves the server locator, spawns the process,
//! runs the initialize handshake, and performs tool discovery. Tool calls
//! are serialized through one request/response channel; `close` releases
//! the process, with `kill_on_drop` as the backstop for early exits.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::ChatError;
use crate::protocol::{McpTool, McpToolResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const STDERR_BUFFER_LINES: usize = 50;

// -----------------------------------------------------------------------------
// JSON-RPC structs
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

// -----------------------------------------------------------------------------
// Target resolution
// -----------------------------------------------------------------------------

/// Map a server locator to a spawnable command. `.py` and `.js` scripts run
/// under their interpreters; extension-less paths are treated as server
/// binaries. Anything else is rejected before a process is spawned.
fn resolve_server_command(target: &Path) -> Result<(String, Vec<String>), ChatError> {
    let target_str = target.to_string_lossy().to_string();
    match target.extension().and_then(|e| e.to_str()) {
        Some("py") => Ok(("python".to_string(), vec![target_str])),
        Some("js") => Ok(("node".to_string(), vec![target_str])),
        None => Ok((target_str, Vec::new())),
        Some(_) => Err(ChatError::UnsupportedTarget(target.to_path_buf())),
    }
}

// -----------------------------------------------------------------------------
// Channel internals
// -----------------------------------------------------------------------------

/// The request/response half of the session. Locked for the duration of
/// each call, which serializes concurrent tool invocations.
struct SessionChannel {
    process: Child,
    stdin: ChildStdin,
    stdout_lines: Lines<BufReader<ChildStdout>>,
    request_id: u64,
}

impl SessionChannel {
    fn next_id(&mut self) -> u64 {
        self.request_id += 1;
        self.request_id
    }

    /// Send a request and wait for the response with the matching id.
    async fn send_request(&mut self, method: &str, params: Option<Value>) -> Result<Value, String> {
        let id = self.next_id();

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        };

        let request_str = serde_json::to_string(&request)
            .map_err(|e| format!("Failed to serialize request: {}", e))?;

        self.stdin
            .write_all(format!("{}\n", request_str).as_bytes())
            .await
            .map_err(|e| format!("Failed to write request: {}", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| format!("Failed to flush request: {}", e))?;

        let read_result = tokio::time::timeout(REQUEST_TIMEOUT, self.read_response(id)).await;

        match read_result {
            Ok(Ok(response)) => {
                if let Some(error) = response.error {
                    Err(format!("MCP error {}: {}", error.code, error.message))
                } else {
                    response
                        .result
                        .ok_or_else(|| "No result in response".to_string())
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(format!("Request timed out waiting for id {}", id)),
        }
    }

    /// Read responses until one carries the expected id, skipping
    /// notifications and stray lines.
    async fn read_response(&mut self, expected_id: u64) -> Result<JsonRpcResponse, String> {
        loop {
            match self.stdout_lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                        Ok(response) if response.id == Some(expected_id) => return Ok(response),
                        Ok(response) => {
                            eprintln!(
                                "[McpSession] Skipping response with id {:?} (expected {})",
                                response.id, expected_id
                            );
                        }
                        Err(_) => {
                            eprintln!("[McpSession] Skipping non-response line: {}", trimmed);
                        }
                    }
                }
                Ok(None) => return Err("Server closed connection (EOF)".to_string()),
                Err(e) => return Err(format!("Failed to read from server: {}", e)),
            }
        }
    }

    /// Send a notification (no response expected).
    async fn send_notification(&mut self, method: &str) -> Result<(), String> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method
        });
        let notif_str = serde_json::to_string(&notification)
            .map_err(|e| format!("Failed to serialize notification: {}", e))?;

        self.stdin
            .write_all(format!("{}\n", notif_str).as_bytes())
            .await
            .map_err(|e| format!("Failed to write notification: {}", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| format!("Failed to flush notification: {}", e))
    }
}

// -----------------------------------------------------------------------------
// Session
// -----------------------------------------------------------------------------

/// The seam the conversation loop invokes tools through.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, ChatError>;
}

/// A connected MCP session: the spawned server process plus the tools it
/// advertised at connect time.
pub struct McpSession {
    channel: Mutex<SessionChannel>,
    stderr_buffer: Arc<Mutex<Vec<String>>>,
    tools: Vec<McpTool>,
}

impl McpSession {
    /// Spawn the server named by `target`, run the initialization
    /// handshake, and discover its tools.
    ///
    /// `data_dir`, when given, is exported to the child so the server
    /// resolves dataset names under it.
    pub async fn connect(target: &Path, data_dir: Option<&Path>) -> Result<Self, ChatError> {
        // Locator validation happens before anything is acquired.
        let (command, args) = resolve_server_command(target)?;

        eprintln!("[McpSession] Spawning process: {} {:?}", command, args);

        let mut cmd = Command::new(&command);
        cmd.args(&args);
        if let Some(dir) = data_dir {
            cmd.env(mcp_data_server::DATA_DIR_ENV, dir);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // Kill the process on drop so no exit path leaks it.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ChatError::Connection(format!("Failed to spawn server process '{}': {}", command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChatError::Connection("Failed to open stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChatError::Connection("Failed to open stdout".to_string()))?;

        // Drain stderr in the background; keep a tail for error reports.
        let stderr_buffer = Arc::new(Mutex::new(Vec::<String>::new()));
        if let Some(stderr) = child.stderr.take() {
            let buffer = stderr_buffer.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("[McpSession] server stderr: {}", line);
                    let mut buffer = buffer.lock().await;
                    if buffer.len() >= STDERR_BUFFER_LINES {
                        buffer.remove(0);
                    }
                    buffer.push(line);
                }
            });
        }

        let mut channel = SessionChannel {
            process: child,
            stdin,
            stdout_lines: BufReader::new(stdout).lines(),
            request_id: 0,
        };

        // Initialize handshake.
        let init = channel
            .send_request(
                "initialize",
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "clientInfo": {
                        "name": "data-chat",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await;

        if let Err(e) = init {
            // Partial acquisition: release the process before reporting.
            let _ = channel.process.kill().await;
            let stderr_tail = stderr_buffer.lock().await;
            return Err(ChatError::Connection(with_stderr_tail(
                format!("Failed to initialize MCP server: {}", e),
                &stderr_tail,
            )));
        }

        if let Err(e) = channel.send_notification("notifications/initialized").await {
            eprintln!("[McpSession] Warning: failed to send initialized notification: {}", e);
        }

        // Tool discovery.
        let tools = match channel.send_request("tools/list", None).await {
            Ok(response) => response
                .get("tools")
                .and_then(|t| t.as_array())
                .map(|tools| {
                    tools
                        .iter()
                        .filter_map(|t| serde_json::from_value(t.clone()).ok())
                        .collect::<Vec<McpTool>>()
                })
                .unwrap_or_default(),
            Err(e) => {
                let _ = channel.process.kill().await;
                let stderr_tail = stderr_buffer.lock().await;
                return Err(ChatError::Connection(with_stderr_tail(
                    format!("Failed to fetch tools: {}", e),
                    &stderr_tail,
                )));
            }
        };

        Ok(McpSession {
            channel: Mutex::new(channel),
            stderr_buffer,
            tools,
        })
    }

    /// The tools advertised at connect time. The set is fixed for the
    /// lifetime of the server process.
    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Release the session: close the child's stdin, then kill and reap the
    /// process. Best-effort; every release is attempted even if an earlier
    /// one fails.
    pub async fn close(self) -> Result<(), ChatError> {
        let SessionChannel {
            mut process,
            stdin,
            stdout_lines,
            ..
        } = self.channel.into_inner();

        // Reverse acquisition order: pipes first, then the process.
        drop(stdout_lines);
        drop(stdin);

        let mut failures = Vec::new();
        if let Err(e) = process.kill().await {
            failures.push(format!("kill failed: {}", e));
        }
        if let Err(e) = process.wait().await {
            failures.push(format!("wait failed: {}", e));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ChatError::Transport(failures.join("; ")))
        }
    }
}

#[async_trait]
impl ToolInvoker for McpSession {
    async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, ChatError> {
        eprintln!("[McpSession] Calling tool {} with args {}", name, arguments);

        let mut channel = self.channel.lock().await;
        let raw = match channel
            .send_request(
                "tools/call",
                Some(json!({
                    "name": name,
                    "arguments": arguments
                })),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                let stderr_tail = self.stderr_buffer.lock().await;
                return Err(ChatError::Transport(with_stderr_tail(e, &stderr_tail)));
            }
        };

        serde_json::from_value(raw)
            .map_err(|e| ChatError::Transport(format!("Failed to parse tool result: {}", e)))
    }
}

fn with_stderr_tail(mut base: String, stderr_tail: &[String]) -> String {
    if !stderr_tail.is_empty() {
        base.push_str("\n\n--- server stderr ---\n");
        base.push_str(&stderr_tail.join("\n"));
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn python_scripts_run_under_python() {
        let (command, args) = resolve_server_command(Path::new("servers/analysis.py")).unwrap();
        assert_eq!(command, "python");
        assert_eq!(args, vec!["servers/analysis.py"]);
    }

    #[test]
    fn javascript_scripts_run_under_node() {
        let (command, args) = resolve_server_command(Path::new("servers/analysis.js")).unwrap();
        assert_eq!(command, "node");
        assert_eq!(args, vec!["servers/analysis.js"]);
    }

    #[test]
    fn extension_less_targets_run_directly() {
        let (command, args) =
            resolve_server_command(Path::new("target/release/mcp-data-server")).unwrap();
        assert_eq!(command, "target/release/mcp-data-server");
        assert!(args.is_empty());
    }

    #[test]
    fn unrecognized_file_types_are_rejected_before_spawn() {
        let err = resolve_server_command(Path::new("server.rb")).unwrap_err();
        match err {
            ChatError::UnsupportedTarget(path) => assert_eq!(path, PathBuf::from("server.rb")),
            other => panic!("expected UnsupportedTarget, got {:?}", other),
        }
    }
}
