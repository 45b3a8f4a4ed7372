//! In-chat slash commands
//!
//! A line starting with `/` is handled here instead of being sent to the
//! model. Any unique prefix selects a command, so `/cl` runs `/clear`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use globset::{GlobBuilder, GlobMatcher};
use indexmap::IndexSet;
use regex::Regex;
use tracing::{debug, instrument};

use crate::core::commit::CommitRequest;
use crate::core::git::repo_relative;
use crate::core::prompts;
use crate::core::session::Session;
use crate::infra::io::touch;

/// What the chat loop does after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Handled locally; read the next line
    Done,
    /// Send this text to the model as the next instruction
    Send(String),
    /// End the session
    Exit,
}

type Handler = fn(&mut Session, &str) -> Result<CommandOutcome>;

struct Command {
    name: &'static str,
    help: &'static str,
    run: Handler,
}

const COMMANDS: &[Command] = &[
    Command {
        name: "add",
        help: "Add files to the chat so the model can edit them",
        run: add,
    },
    Command {
        name: "clear",
        help: "Clear the chat history",
        run: clear,
    },
    Command {
        name: "commit",
        help: "Commit edits made outside the chat (commit message optional)",
        run: commit,
    },
    Command {
        name: "diff",
        help: "Display the diff of the last commit made by the chat",
        run: diff,
    },
    Command {
        name: "drop",
        help: "Remove files from the chat (all of them when none are named)",
        run: drop_files,
    },
    Command {
        name: "exit",
        help: "Exit the application",
        run: exit,
    },
    Command {
        name: "help",
        help: "Show help about all commands",
        run: help,
    },
    Command {
        name: "ls",
        help: "List repo files and mark which are in the chat",
        run: ls,
    },
    Command {
        name: "quit",
        help: "Exit the application",
        run: exit,
    },
    Command {
        name: "undo",
        help: "Undo the last commit if it was made by the chat",
        run: undo,
    },
];

/// Double-quoted names (spaces allowed) or bare words
static FILE_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(.+?)"|(\S+)"#).expect("file argument pattern is valid"));

pub fn is_command(line: &str) -> bool {
    line.trim_start().starts_with('/')
}

/// Run the command named by the first word of `line`
#[instrument(skip(session))]
pub fn dispatch(session: &mut Session, line: &str) -> Result<CommandOutcome> {
    let line = line.trim();
    let (word, args) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    let name = word.trim_start_matches('/');

    let matching: Vec<&Command> = match COMMANDS.iter().find(|c| c.name == name) {
        Some(exact) => vec![exact],
        None => COMMANDS.iter().filter(|c| c.name.starts_with(name)).collect(),
    };

    match matching.as_slice() {
        [cmd] => {
            debug!(command = cmd.name, "running command");
            (cmd.run)(session, args.trim())
        }
        [] => {
            session.prompter.warn(&format!("Invalid command: {word}"));
            Ok(CommandOutcome::Done)
        }
        many => {
            let names: Vec<String> = many.iter().map(|c| format!("/{}", c.name)).collect();
            session
                .prompter
                .warn(&format!("Ambiguous command: {}", names.join(", ")));
            Ok(CommandOutcome::Done)
        }
    }
}

fn parse_file_args(args: &str) -> Vec<String> {
    FILE_ARG
        .captures_iter(args)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Glob over `/`-separated relative paths; None when `pattern` is invalid
fn glob(pattern: &str) -> Option<GlobMatcher> {
    match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(g) => Some(g.compile_matcher()),
        Err(e) => {
            debug!(%pattern, error = %e, "not a glob");
            None
        }
    }
}

/// Repository files (absolute) matching `pattern` or lying under it when it
/// names a directory. Patterns are relative to the session root.
fn repo_matches(session: &Session, pattern: &str) -> Result<Vec<PathBuf>> {
    let Some(repo) = session.repo.as_deref() else {
        return Ok(Vec::new());
    };
    let Some(base) = repo_relative(repo, session.files.root()) else {
        return Ok(Vec::new());
    };
    let full = base.join(pattern);
    let matcher = glob(&full.to_string_lossy());

    Ok(repo
        .tracked_files()?
        .into_iter()
        .filter(|rel| rel.starts_with(&full) || matcher.as_ref().is_some_and(|m| m.is_match(rel)))
        .map(|rel| repo.root().join(rel))
        .collect())
}

fn add(session: &mut Session, args: &str) -> Result<CommandOutcome> {
    let words = parse_file_args(args);
    if words.is_empty() {
        session.prompter.warn("Usage: /add FILE...");
        return Ok(CommandOutcome::Done);
    }

    let mut candidates: IndexSet<PathBuf> = IndexSet::new();
    for word in &words {
        let path = session.files.root().join(word);
        if path.is_file() {
            candidates.insert(path);
            continue;
        }

        let matched = repo_matches(session, word)?;
        if !matched.is_empty() {
            candidates.extend(matched);
            continue;
        }

        let question = format!(
            "No files matched '{word}'. Do you want to create {}?",
            path.display()
        );
        if session.prompter.confirm(&question)? {
            touch(&path)?;
            candidates.insert(path);
        }
    }

    let mut added: Vec<String> = Vec::new();
    for path in candidates {
        let abs = session.files.resolve(&path)?;
        if !abs.starts_with(session.files.root()) {
            session.prompter.warn(&format!(
                "Can not add {}, which is not within {}",
                abs.display(),
                session.files.root().display()
            ));
            continue;
        }
        let shown = session.files.display_path(&abs).display().to_string();
        if session.files.contains(&abs) {
            session.prompter.warn(&format!("{shown} is already in the chat"));
            continue;
        }
        session.files.adopt(&abs);
        session.prompter.notify(&format!("Added {shown} to the chat"));
        added.push(shown);
    }

    // Only worth telling the model mid-conversation
    if added.is_empty() || session.context.active().is_empty() {
        return Ok(CommandOutcome::Done);
    }
    Ok(CommandOutcome::Send(prompts::added_files(&added.join(", "))))
}

fn drop_files(session: &mut Session, args: &str) -> Result<CommandOutcome> {
    let words = parse_file_args(args);
    if words.is_empty() {
        session
            .prompter
            .notify("Dropping all files from the chat session.");
        session.files.clear();
        return Ok(CommandOutcome::Done);
    }

    for word in &words {
        let matcher = glob(word);
        let literal = session.files.root().join(word);
        let targets: Vec<PathBuf> = session
            .files
            .paths()
            .filter(|abs| {
                let shown = session.files.display_path(abs);
                *abs == literal.as_path()
                    || shown.starts_with(word)
                    || matcher.as_ref().is_some_and(|m| m.is_match(shown))
            })
            .map(Path::to_path_buf)
            .collect();

        for abs in targets {
            session.files.remove(&abs);
            let shown = session.files.display_path(&abs).display().to_string();
            session
                .prompter
                .notify(&format!("Removed {shown} from the chat"));
        }
    }
    Ok(CommandOutcome::Done)
}

fn ls(session: &mut Session, _args: &str) -> Result<CommandOutcome> {
    let chat: Vec<String> = session
        .files
        .paths()
        .map(|abs| session.files.display_path(abs).display().to_string())
        .collect();

    let mut others: Vec<String> = Vec::new();
    if let Some(repo) = session.repo.as_deref() {
        for rel in repo.tracked_files()? {
            let abs = repo.root().join(&rel);
            if !session.files.contains(&abs) {
                others.push(session.files.display_path(&abs).display().to_string());
            }
        }
    }

    if chat.is_empty() && others.is_empty() {
        session.prompter.notify("\nNo files in chat or git repo.");
        return Ok(CommandOutcome::Done);
    }
    if !chat.is_empty() {
        session.prompter.notify("Files in chat:\n");
        for f in &chat {
            session.prompter.notify(&format!("  {f}"));
        }
    }
    if !others.is_empty() {
        session.prompter.notify("\nRepo files not in the chat:\n");
        for f in &others {
            session.prompter.notify(&format!("  {f}"));
        }
    }
    Ok(CommandOutcome::Done)
}

fn commit(session: &mut Session, args: &str) -> Result<CommandOutcome> {
    let Some(repo) = session.repo.as_deref() else {
        session.prompter.warn("No git repository found.");
        return Ok(CommandOutcome::Done);
    };
    if !repo.is_dirty()? {
        session.prompter.warn("No more changes to commit.");
        return Ok(CommandOutcome::Done);
    }

    let record = session.commit(CommitRequest {
        message: Some(args),
        ..Default::default()
    })?;
    if record.is_none() {
        session
            .prompter
            .warn("No changes to commit in the chat's files.");
    }
    Ok(CommandOutcome::Done)
}

fn undo(session: &mut Session, _args: &str) -> Result<CommandOutcome> {
    let Some(repo) = session.repo.as_deref_mut() else {
        session.prompter.warn("No git repository found.");
        return Ok(CommandOutcome::Done);
    };

    let head = repo.head_short_hash()?;
    let touched = repo.files_in_commit(&head)?;
    if !touched.is_disjoint(&repo.dirty_files()?) {
        session.prompter.warn(
            "The repository has uncommitted changes in files that were modified in the last \
             commit. Please commit or stash them before undoing.",
        );
        return Ok(CommandOutcome::Done);
    }

    if repo.head_is_pushed()? {
        session.prompter.warn(
            "The last commit has already been pushed to the origin. Undoing is not possible.",
        );
        return Ok(CommandOutcome::Done);
    }

    let Some(last) = session.last_commit.take_if(|c| c.hash == head) else {
        session
            .prompter
            .warn("The last commit was not made by the chat in this session.");
        session.prompter.warn(
            "You could try `git reset --hard HEAD^` but be aware that this is a destructive \
             command!",
        );
        return Ok(CommandOutcome::Done);
    };

    repo.reset_to_parent()?;
    session.prompter.notify(&format!(
        "{}\nThe above commit {} was reset and removed from git.\n",
        last.message, last.hash
    ));
    session.files.mark_synced();
    session.context.fold(prompts::UNDO_NOTICE);
    Ok(CommandOutcome::Done)
}

fn diff(session: &mut Session, _args: &str) -> Result<CommandOutcome> {
    let Some(repo) = session.repo.as_deref() else {
        session.prompter.warn("No git repository found.");
        return Ok(CommandOutcome::Done);
    };
    let Some(last) = &session.last_commit else {
        session.prompter.warn("No previous commit from the chat found.");
        session.prompter.warn("You could try `git diff` or `git diff HEAD^`.");
        return Ok(CommandOutcome::Done);
    };

    let patch = repo.commit_diff(&last.hash)?;
    session.prompter.notify(patch.trim_end());
    Ok(CommandOutcome::Done)
}

fn clear(session: &mut Session, _args: &str) -> Result<CommandOutcome> {
    session.context.clear();
    session.prompter.notify("Cleared chat history.");
    Ok(CommandOutcome::Done)
}

fn help(session: &mut Session, _args: &str) -> Result<CommandOutcome> {
    for cmd in COMMANDS {
        session
            .prompter
            .notify(&format!("/{} {}", cmd.name, cmd.help));
    }
    Ok(CommandOutcome::Done)
}

fn exit(_session: &mut Session, _args: &str) -> Result<CommandOutcome> {
    Ok(CommandOutcome::Exit)
}
