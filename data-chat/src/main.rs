//! data-chat: interactive chat client backed by an MCP data-analysis server.
//!
//! Spawns the server, discovers its tools, and runs a REPL where each query
//! goes through the model/tool conversation loop. Type `quit` to exit.

mod cli;
mod conversation;
mod error;
mod message_builders;
mod model;
mod protocol;
mod session;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use cli::CliArgs;
use error::ChatError;
use model::CompletionsClient;
use protocol::OpenAITool;
use session::McpSession;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        eprintln!("[data-chat] {}", e);
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), ChatError> {
    let model = CompletionsClient::new(args.model_settings())?;

    let session = McpSession::connect(&args.server, args.data_dir.as_deref()).await?;

    let tool_names: Vec<&str> = session.tools().iter().map(|t| t.name.as_str()).collect();
    println!(
        "Connected! Discovered {} tools: {}",
        tool_names.len(),
        tool_names.join(", ")
    );

    let tool_schemas: Vec<OpenAITool> = session.tools().iter().map(OpenAITool::from_mcp).collect();
    let config = args.conversation_config();

    let loop_result = chat_loop(&model, &session, &tool_schemas, &config).await;

    // Release the server process even if the REPL errored out.
    if let Err(e) = session.close().await {
        eprintln!("[data-chat] cleanup failed: {}", e);
    }

    loop_result
}

async fn chat_loop(
    model: &CompletionsClient,
    session: &McpSession,
    tool_schemas: &[OpenAITool],
    config: &conversation::ConversationConfig,
) -> Result<(), ChatError> {
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(b"Query: ")
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let line = tokio::select! {
            line = stdin_lines.next_line() => {
                line.map_err(|e| ChatError::Transport(e.to_string()))?
            }
            _ = tokio::signal::ctrl_c() => {
                // Cancellation between queries; any dataset mutations the
                // server already applied stay applied.
                println!();
                break;
            }
        };

        let query = match line {
            Some(line) => line.trim().to_string(),
            None => break, // stdin closed
        };

        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }

        // Per-query failures end the query, not the session.
        match conversation::run_query(model, session, tool_schemas, &query, config).await {
            Ok(transcript) => println!("{}", transcript),
            Err(e) => eprintln!("[data-chat] query failed: {}", e),
        }
    }

    Ok(())
}
