use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool, // global --quiet
}

#[derive(Parser, Debug)]
#[command(name = "chatedit")]
#[command(about = "Chat with a language model about code and let it edit your files")]
#[command(version, long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Source files to edit during the chat
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Model for the main chat (default: gpt-4)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Model for escalated edits and commit messages (default: gpt-3.5-turbo)
    #[arg(long, value_name = "MODEL")]
    pub edit_model: Option<String>,

    /// Apply the edit blocks in FILE instead of running the chat
    #[arg(long, value_name = "FILE")]
    pub apply: Option<PathBuf>,

    /// Commit dirty files at startup without confirmation
    #[arg(long, env = "CHATEDIT_COMMIT_DIRTY")]
    pub commit_dirty: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_pretty: bool,

    /// Only log warnings and errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a chatedit.toml config file
    Init(InitArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}
