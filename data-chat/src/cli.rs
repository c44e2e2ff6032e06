//! Command-line argument parsing.
//!
//! Endpoint configuration comes from flags or the matching environment
//! variables; generation parameters carry fixed defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::conversation::ConversationConfig;
use crate::model::ModelSettings;

pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.95;

/// CLI arguments for data-chat
#[derive(Parser, Debug, Clone)]
#[command(name = "data-chat", about = "Chat with an MCP data-analysis server")]
pub struct CliArgs {
    /// Path to the MCP server: a .py or .js script, or a server executable
    #[arg(value_name = "SERVER")]
    pub server: PathBuf,

    /// Azure OpenAI endpoint base URL
    #[arg(long, value_name = "URL", env = "ENDPOINT_URL")]
    pub endpoint_url: String,

    /// Azure OpenAI API key
    #[arg(long, value_name = "KEY", env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Deployment name to address completions to
    #[arg(long, value_name = "NAME", env = "DEPLOYMENT_NAME")]
    pub deployment: String,

    /// Maximum model calls per query
    #[arg(long, value_name = "INT", default_value_t = crate::conversation::DEFAULT_MAX_TURNS)]
    pub max_turns: usize,

    /// Maximum tokens per completion
    #[arg(long, value_name = "INT", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, value_name = "FLOAT", default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,

    /// Nucleus sampling parameter
    #[arg(long, value_name = "FLOAT", default_value_t = DEFAULT_TOP_P)]
    pub top_p: f64,

    /// Directory the server resolves dataset names under (exported to the
    /// server process)
    #[arg(long, value_name = "DIR", env = mcp_data_server::DATA_DIR_ENV)]
    pub data_dir: Option<PathBuf>,
}

impl CliArgs {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            endpoint: self.endpoint_url.clone(),
            api_key: self.api_key.clone(),
            deployment: self.deployment.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            max_turns: self.max_turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_generation_parameters() {
        let args = CliArgs::parse_from([
            "data-chat",
            "server.py",
            "--endpoint-url",
            "https://example.openai.azure.com",
            "--api-key",
            "key",
            "--deployment",
            "gpt-test",
        ]);
        assert_eq!(args.max_tokens, 1000);
        assert_eq!(args.temperature, 0.7);
        assert_eq!(args.top_p, 0.95);
        assert_eq!(args.max_turns, 16);
        assert!(args.data_dir.is_none());

        let settings = args.model_settings();
        assert_eq!(settings.deployment, "gpt-test");
    }

    #[test]
    fn flags_override_defaults() {
        let args = CliArgs::parse_from([
            "data-chat",
            "target/release/mcp-data-server",
            "--endpoint-url",
            "https://example.openai.azure.com",
            "--api-key",
            "key",
            "--deployment",
            "gpt-test",
            "--max-turns",
            "4",
            "--data-dir",
            "datasets",
        ]);
        assert_eq!(args.conversation_config().max_turns, 4);
        assert_eq!(args.data_dir, Some(PathBuf::from("datasets")));
    }
}
