//! MCP stdio server for dataset analysis.
//!
//! - Serves MCP (JSON-RPC 2.0, one object per line) over stdin/stdout
//! - Holds the single mutable dataset all tools share
//! - Answers every validation problem as tool-result data, never a fault
//!
//! Diagnostics go to stderr; stdout carries only protocol frames.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::dataset::{Comparator, Dataset};

// -----------------------------------------------------------------------------
// Constants & CLI
// -----------------------------------------------------------------------------

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_EXTENSION: &str = "csv";

/// Environment variable the chat client uses to point a spawned server at a
/// dataset directory.
pub const DATA_DIR_ENV: &str = "DATA_SERVER_DATA_DIR";

#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-data-server", about = "MCP stdio server for dataset analysis")]
pub struct CliArgs {
    /// Base directory dataset names are resolved under
    #[arg(long, value_name = "DIR", env = DATA_DIR_ENV, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
    /// File extension appended to bare dataset names
    #[arg(long, value_name = "EXT", env = "DATA_SERVER_EXTENSION", default_value = DEFAULT_EXTENSION)]
    pub extension: String,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// JSON-RPC structs (MCP)
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

// -----------------------------------------------------------------------------
// Tool registry & dispatch
// -----------------------------------------------------------------------------

/// The closed set of callable tools. Descriptors and dispatch both derive
/// from this enum, so the advertised set and the accepted set cannot drift
/// apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTool {
    LoadData,
    GetColumnNames,
    DescribeColumn,
    GetValueCounts,
    Filter,
    RemoveOutliers,
    ComputeMean,
    ComputeStandardDeviation,
}

impl DataTool {
    pub const ALL: [DataTool; 8] = [
        DataTool::LoadData,
        DataTool::GetColumnNames,
        DataTool::DescribeColumn,
        DataTool::GetValueCounts,
        DataTool::Filter,
        DataTool::RemoveOutliers,
        DataTool::ComputeMean,
        DataTool::ComputeStandardDeviation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataTool::LoadData => "load_data",
            DataTool::GetColumnNames => "get_column_names",
            DataTool::DescribeColumn => "describe_column",
            DataTool::GetValueCounts => "get_value_counts",
            DataTool::Filter => "filter",
            DataTool::RemoveOutliers => "remove_outliers",
            DataTool::ComputeMean => "compute_mean",
            DataTool::ComputeStandardDeviation => "compute_standard_deviation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    fn descriptor(self) -> Tool {
        let column_schema = |description: &str| {
            json!({
                "type": "object",
                "properties": {
                    "column_name": {"type": "string", "description": description}
                },
                "required": ["column_name"]
            })
        };

        match self {
            DataTool::LoadData => Tool {
                name: self.name().to_string(),
                description: "Load data from `file_name`. Must be executed before all other tools."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_name": {"type": "string", "description": "Dataset name or path to load"}
                    },
                    "required": ["file_name"]
                }),
            },
            DataTool::GetColumnNames => Tool {
                name: self.name().to_string(),
                description:
                    "Returns all column names of the dataset. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            DataTool::DescribeColumn => Tool {
                name: self.name().to_string(),
                description:
                    "Returns summary statistics for `column_name`. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: column_schema("Name of column to describe"),
            },
            DataTool::GetValueCounts => Tool {
                name: self.name().to_string(),
                description:
                    "Returns occurrence counts for each value in `column_name`. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: column_schema("Name of column to count values in"),
            },
            DataTool::Filter => Tool {
                name: self.name().to_string(),
                description:
                    "Filters rows by comparing `column_name` against `value`. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "column_name": {"type": "string", "description": "Name of column to filter"},
                        "value": {"type": "number", "description": "Value to filter by"},
                        "by": {
                            "type": "string",
                            "enum": ["equal", "less", "less/equal", "greater", "greater/equal"],
                            "description": "Comparison to apply: keep rows equal to, less than, less than or equal to, greater than, or greater than or equal to `value`"
                        }
                    },
                    "required": ["column_name", "value", "by"]
                }),
            },
            DataTool::RemoveOutliers => Tool {
                name: self.name().to_string(),
                description:
                    "Removes outliers from `column_name` with the interquartile range method. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: column_schema("Name of column to remove outliers from"),
            },
            DataTool::ComputeMean => Tool {
                name: self.name().to_string(),
                description:
                    "Computes the mean of `column_name`. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: column_schema("Name of column to average"),
            },
            DataTool::ComputeStandardDeviation => Tool {
                name: self.name().to_string(),
                description:
                    "Computes the sample standard deviation of `column_name`. Must execute `load_data` before using this tool."
                        .to_string(),
                input_schema: column_schema("Name of column to compute standard deviation for"),
            },
        }
    }
}

fn get_tools() -> Vec<Tool> {
    DataTool::ALL.into_iter().map(DataTool::descriptor).collect()
}

// -----------------------------------------------------------------------------
// Server state
// -----------------------------------------------------------------------------

/// Shared server state: path-resolution policy plus the single dataset slot.
/// The mutex serializes readers and writers; a read concurrent with a filter
/// is never observable.
pub struct ServerState {
    data_dir: PathBuf,
    extension: String,
    dataset: Mutex<Option<Dataset>>,
}

impl ServerState {
    pub fn new(args: &CliArgs) -> Self {
        Self {
            data_dir: args.data_dir.clone(),
            extension: args.extension.clone(),
            dataset: Mutex::new(None),
        }
    }

    /// Resolve a bare dataset name: append the configured extension when
    /// missing, anchor under the base directory when not already there.
    fn resolve_data_path(&self, file_name: &str) -> PathBuf {
        let suffix = format!(".{}", self.extension);
        let mut name = file_name.to_string();
        if !name.ends_with(&suffix) {
            name.push_str(&suffix);
        }
        let candidate = Path::new(&name);
        if candidate.starts_with(&self.data_dir) {
            candidate.to_path_buf()
        } else {
            self.data_dir.join(candidate)
        }
    }
}

// -----------------------------------------------------------------------------
// Entry point & stdio loop
// -----------------------------------------------------------------------------

pub async fn run_with_args(args: CliArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    eprintln!(
        "[mcp-data-server] starting (data_dir={}, extension={})",
        args.data_dir.display(),
        args.extension
    );
    let state = Arc::new(ServerState::new(&args));
    run_stdio_loop(state).await?;
    Ok(())
}

async fn run_stdio_loop(state: Arc<ServerState>) -> io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    eprintln!("[mcp-data-server] stdio MCP loop ready on stdin/stdout");

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        eprintln!("[mcp-data-server] MCP recv: {}", trimmed);

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => {
                // Notifications carry no id and get no response.
                if request.id.is_none() && request.method.starts_with("notifications/") {
                    continue;
                }
                handle_request(request, state.clone()).await
            }
            Err(e) => JsonRpcResponse {
                jsonrpc: "2.0",
                id: Value::Null,
                result: None,
                error: Some(JsonRpcError {
                    code: -32700,
                    message: format!("Parse error: {}", e),
                    data: None,
                }),
            },
        };

        let response_str = serde_json::to_string(&response).unwrap_or_else(|e| {
            format!("{{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{{\"code\":-32000,\"message\":\"Serialize error: {}\"}}}}", e)
        });
        eprintln!("[mcp-data-server] MCP send: {}", response_str);
        stdout.write_all(response_str.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    eprintln!("[mcp-data-server] stdin closed at {}, shutting down", Utc::now().to_rfc3339());
    Ok(())
}

async fn handle_request(request: JsonRpcRequest, state: Arc<ServerState>) -> JsonRpcResponse {
    let id = request.id.unwrap_or(Value::Null);

    match request.method.as_str() {
        "initialize" => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mcp-data-server", "version": env!("CARGO_PKG_VERSION")}
            })),
            error: None,
        },
        "notifications/initialized" => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(json!({})),
            error: None,
        },
        "tools/list" => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(json!({ "tools": get_tools() })),
            error: None,
        },
        "tools/call" => {
            let params = request.params.unwrap_or(json!({}));
            let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

            let (text, is_error) = match DataTool::from_name(tool_name) {
                Some(tool) => match execute_tool(tool, arguments, &state).await {
                    Ok(result) => (result, false),
                    Err(error) => (error, true),
                },
                None => (format!("Unknown tool: {}", tool_name), true),
            };

            JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": is_error
                })),
                error: None,
            }
        }
        _ => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {}", request.method),
                data: None,
            }),
        },
    }
}

// -----------------------------------------------------------------------------
// Tool executor
// -----------------------------------------------------------------------------

const MUST_LOAD_FIRST: &str = "Must execute `load_data` first.";

fn require_str(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("Missing required parameter: {}", key))
}

fn require_number(args: &Value, key: &str) -> Result<f64, String> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| format!("Missing required parameter: {}", key))
}

fn data_size_result(rows: usize) -> String {
    json!({
        "success": true,
        "information": { "data size": rows }
    })
    .to_string()
}

fn failure_result(message: String) -> String {
    json!({
        "success": false,
        "information": { "error message": message }
    })
    .to_string()
}

/// Execute one tool call against the shared dataset.
///
/// `Ok` carries the result payload as text (including deliberate
/// `success: false` payloads such as an unrecognized `filter` comparator);
/// `Err` carries a validation message the caller reports with `isError`.
/// Every tool except `load_data` requires a loaded dataset.
async fn execute_tool(tool: DataTool, args: Value, state: &ServerState) -> Result<String, String> {
    if tool == DataTool::LoadData {
        let file_name = require_str(&args, "file_name")?;
        let path = state.resolve_data_path(&file_name);
        eprintln!("[mcp-data-server] load_data resolving to {}", path.display());
        let loaded = Dataset::from_csv_path(&path)?;
        let rows = loaded.row_count();
        let mut dataset = state.dataset.lock().await;
        // Wholesale replacement; any previous dataset and its narrowing are
        // discarded.
        *dataset = Some(loaded);
        return Ok(data_size_result(rows));
    }

    let mut guard = state.dataset.lock().await;
    let dataset = guard.as_mut().ok_or_else(|| MUST_LOAD_FIRST.to_string())?;

    match tool {
        DataTool::LoadData => unreachable!("handled above"),
        DataTool::GetColumnNames => Ok(json!(dataset.column_names()).to_string()),
        DataTool::DescribeColumn => {
            let column = require_str(&args, "column_name")?;
            Ok(dataset.describe(&column)?.to_string())
        }
        DataTool::GetValueCounts => {
            let column = require_str(&args, "column_name")?;
            Ok(dataset.value_counts(&column)?.to_string())
        }
        DataTool::Filter => {
            let column = require_str(&args, "column_name")?;
            let value = require_number(&args, "value")?;
            let by = require_str(&args, "by")?;
            match Comparator::parse(&by) {
                Some(comparator) => {
                    let rows = dataset.filter(&column, value, comparator)?;
                    Ok(data_size_result(rows))
                }
                // The designed convention: a bad comparator is data, not a
                // fault, and leaves the dataset untouched.
                None => Ok(failure_result(format!(
                    "Unrecognized value for `by`: \"{}\".",
                    by
                ))),
            }
        }
        DataTool::RemoveOutliers => {
            let column = require_str(&args, "column_name")?;
            let rows = dataset.remove_outliers(&column)?;
            Ok(data_size_result(rows))
        }
        DataTool::ComputeMean => {
            let column = require_str(&args, "column_name")?;
            Ok(json!(dataset.mean(&column)?).to_string())
        }
        DataTool::ComputeStandardDeviation => {
            let column = require_str(&args, "column_name")?;
            Ok(json!(dataset.standard_deviation(&column)?).to_string())
        }
    }
}
