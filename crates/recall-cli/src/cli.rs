use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "recall")]
#[command(version, about = "Recall - session memory capture for coding assistants")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to <config_dir>/recall/config.toml)
    #[arg(long, global = true, env = "RECALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (defaults to <data_dir>/recall/recall.db)
    #[arg(long, global = true, env = "RECALL_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Record a tool invocation
    Observe(ObserveArgs),

    /// Record a user turn
    Prompt(PromptArgs),

    /// Request a session summary
    Summarize(SummarizeArgs),

    /// Mark a session completed
    End(EndArgs),

    /// Process queued work until the queue is empty
    Drain(DrainArgs),

    /// Show queued work and stored records per session
    Status,
}

#[derive(Args, Clone)]
pub struct ObserveArgs {
    #[arg(long)]
    pub session: String,

    /// Tool name
    #[arg(long)]
    pub tool: String,

    /// Tool input, usually JSON
    #[arg(long, default_value = "")]
    pub input: String,

    /// Tool output
    #[arg(long, default_value = "")]
    pub output: String,

    #[arg(long)]
    pub cwd: Option<String>,

    #[arg(long)]
    pub prompt_number: Option<u32>,

    /// Only queue the item; a later `drain` processes it
    #[arg(long)]
    pub queue_only: bool,
}

#[derive(Args, Clone)]
pub struct PromptArgs {
    #[arg(long)]
    pub session: String,

    #[arg(long)]
    pub project: String,

    /// The user's prompt text
    #[arg(long)]
    pub text: String,

    #[arg(long, default_value_t = 1)]
    pub prompt_number: u32,

    /// Only record the turn; a later `drain` sends it
    #[arg(long)]
    pub queue_only: bool,
}

#[derive(Args, Clone)]
pub struct SummarizeArgs {
    #[arg(long)]
    pub session: String,

    /// Last assistant message of the session
    #[arg(long)]
    pub last_message: Option<String>,

    /// Only queue the request; a later `drain` processes it
    #[arg(long)]
    pub queue_only: bool,
}

#[derive(Args, Clone)]
pub struct EndArgs {
    #[arg(long)]
    pub session: String,
}

#[derive(Args, Clone, Default)]
pub struct DrainArgs {
    /// Drain one session instead of every session with pending work
    #[arg(long)]
    pub session: Option<String>,
}
