//! **chatedit** - Conversational code editing on top of git
//!
//! Sends tracked files and your instructions to a language model, applies the
//! ORIGINAL/UPDATED edit blocks it answers with (tolerating stale or
//! re-indented snippets) and commits each applied change.

/// Command-line interface with clap integration
pub mod cli;

/// Editing engine - extraction, fuzzy matching, apply, context and commits
pub mod core {
    /// Fuzzy chunk locator and patcher
    pub mod matcher;
    pub use matcher::{MatchConfig, locate_and_replace};

    /// Permissive ORIGINAL/UPDATED block extractor
    pub mod edit;
    pub use edit::{EditDirective, extract};

    /// Per-directive apply state machine with escalation
    pub mod apply_engine;
    pub use apply_engine::{ApplyEngine, ApplyReport, DirectiveState};

    /// Registry of files participating in the chat
    pub mod tracked;
    pub use tracked::TrackedFiles;

    /// Model seam, messages and rate-limit retry
    pub mod model;
    pub use model::{Message, ModelClient, Reply, Role};

    /// Repository seam and the git-backed implementation
    pub mod git;
    pub use git::{GitRepo, Repository};

    /// Archived/active conversation plus the per-turn file frame
    pub mod context;
    pub use context::ConversationContext;

    /// Commit synchronization with drafted messages
    pub mod commit;
    pub use commit::{CommitRecord, CommitRequest};

    /// Prompt texts and conversation markers
    pub mod prompts;

    /// In-chat slash commands
    pub mod commands;
    pub use commands::CommandOutcome;

    /// Session state and the turn loop
    pub mod session;
    pub use session::{Session, SessionSettings, TurnOutcome};
}

/// Infrastructure - configuration, I/O, terminal and process plumbing
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Atomic writes and path helpers
    pub mod io;

    /// Interactive prompts over stdin/stdout
    pub mod console;
    pub use console::{ConsolePrompter, Input, Prompter};

    /// SIGINT as a polled flag
    pub mod interrupt;
    pub use interrupt::Interrupt;

    /// Model client that runs an external command
    pub mod command_model;
    pub use command_model::CommandModel;

    /// tracing-subscriber setup
    pub mod logging;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{Session, SessionSettings};
pub use infra::{Config, load_config};
