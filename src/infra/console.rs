//! Interactive terminal I/O
//!
//! [`Prompter`] is everything the engine needs from a human: the next
//! instruction, yes/no answers, free-text answers and notices.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::infra::interrupt::Interrupt;

/// Result of reading one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C while waiting for input
    Interrupted,
    /// End of input stream
    Eof,
}

pub trait Prompter {
    /// Next user instruction. A line holding only `{` starts multi-line
    /// input that runs until a line holding only `}`.
    fn read_input(&mut self) -> Result<Input>;

    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Free-text answer, trimmed
    fn ask(&mut self, question: &str) -> Result<String>;

    fn notify(&mut self, message: &str);

    fn warn(&mut self, message: &str);
}

/// Line-based prompter over any reader/writer pair
pub struct ConsolePrompter<R, W> {
    reader: R,
    writer: W,
    pretty: bool,
    interrupt: Interrupt,
}

impl ConsolePrompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(pretty: bool, interrupt: Interrupt) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), pretty, interrupt)
    }
}

impl<R: BufRead, W: Write> ConsolePrompter<R, W> {
    pub fn new(reader: R, writer: W, pretty: bool, interrupt: Interrupt) -> Self {
        Self {
            reader,
            writer,
            pretty,
            interrupt,
        }
    }

    fn prompt(&mut self, text: &str) -> Result<()> {
        if self.pretty {
            write!(self.writer, "{}", text.green())?;
        } else {
            write!(self.writer, "{text}")?;
        }
        self.writer.flush().context("Failed to flush prompt")
    }

    /// None on end of input
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .context("Failed to read from input")?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    fn emit(&mut self, message: &str, warn: bool) {
        let res = match (self.pretty, warn) {
            (true, true) => writeln!(self.writer, "{}", message.red().bold()),
            (true, false) => writeln!(self.writer, "{}", message.cyan()),
            (false, _) => writeln!(self.writer, "{message}"),
        };
        if let Err(e) = res {
            tracing::debug!(error = %e, "console write failed");
        }
    }
}

impl<R: BufRead, W: Write> Prompter for ConsolePrompter<R, W> {
    fn read_input(&mut self) -> Result<Input> {
        self.interrupt.clear();
        writeln!(self.writer)?;

        let mut buf = String::new();
        let mut multiline = false;
        loop {
            self.prompt(if multiline { ". " } else { "> " })?;
            let line = self.read_line()?;
            if self.interrupt.take() {
                return Ok(Input::Interrupted);
            }
            let Some(line) = line else {
                return Ok(Input::Eof);
            };

            match line.trim() {
                "{" if !multiline => multiline = true,
                "}" if multiline => return Ok(Input::Line(buf)),
                _ if multiline => {
                    buf.push_str(&line);
                    buf.push('\n');
                }
                _ => return Ok(Input::Line(line)),
            }
        }
    }

    /// Ctrl-C at the prompt declines
    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.interrupt.clear();
        self.prompt(&format!("{question} [y/n] "))?;
        let answer = self.read_line()?.unwrap_or_default();
        if self.interrupt.take() {
            return Ok(false);
        }
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        self.interrupt.clear();
        self.prompt(&format!("{question} "))?;
        let answer = self.read_line()?.unwrap_or_default();
        // A Ctrl-C while waiting belongs to this prompt
        self.interrupt.take();
        Ok(answer.trim().to_string())
    }

    fn notify(&mut self, message: &str) {
        self.emit(message, false);
    }

    fn warn(&mut self, message: &str) {
        self.emit(message, true);
    }
}
