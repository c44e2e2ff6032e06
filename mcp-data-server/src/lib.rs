//! MCP stdio server for dataset analysis, also linkable as a library so the
//! chat client can share its configuration defaults.

pub mod dataset;
pub mod server;

pub use server::{run_with_args, CliArgs, DATA_DIR_ENV, DEFAULT_DATA_DIR, DEFAULT_EXTENSION};
