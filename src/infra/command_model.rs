//! Model client backed by an external program
//!
//! The program receives `{"model": ..., "messages": [...]}` as JSON on stdin
//! and streams the reply text on stdout. Exit status 75 (`EX_TEMPFAIL`) means
//! rate limited; the last line of stderr then holds the delay in seconds.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::core::model::{Message, ModelClient, ModelError, Reply};
use crate::infra::interrupt::Interrupt;

const EX_TEMPFAIL: i32 = 75;
const DEFAULT_RETRY: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(50);

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Clone)]
pub struct CommandModel {
    command: Vec<String>,
    interrupt: Interrupt,
}

impl CommandModel {
    pub fn new(command: Vec<String>, interrupt: Interrupt) -> Self {
        Self { command, interrupt }
    }

    fn spawn(&self) -> Result<Child, ModelError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(ModelError::NotConfigured);
        };
        debug!(%program, "spawning model command");
        Ok(Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?)
    }
}

impl ModelClient for CommandModel {
    fn complete(
        &mut self,
        model: &str,
        messages: &[Message],
        silent: bool,
    ) -> Result<Reply, ModelError> {
        let payload = serde_json::to_vec(&Request { model, messages })
            .map_err(|e| ModelError::Request(format!("cannot encode request: {e}")))?;

        let mut child = self.spawn()?;

        // Drain both pipes before writing so a chatty child cannot stall us
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        } else {
            drop(tx);
        }
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut s = String::new();
                let _ = stderr.read_to_string(&mut s);
                s
            })
        });

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload)?;
        }

        let mut received: Vec<u8> = Vec::new();
        let mut out = io::stdout();
        loop {
            if self.interrupt.take() {
                let _ = child.kill();
                let _ = child.wait();
                debug!(bytes = received.len(), "model reply interrupted");
                return Ok(Reply::interrupted(String::from_utf8_lossy(&received)));
            }
            match rx.recv_timeout(POLL) {
                Ok(chunk) => {
                    if !silent {
                        let _ = out.write_all(&chunk);
                        let _ = out.flush();
                    }
                    received.extend_from_slice(&chunk);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if !silent {
            let _ = writeln!(out);
        }

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");

        if status.code() == Some(EX_TEMPFAIL) {
            let retry_after = last_line
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_RETRY);
            return Err(ModelError::RateLimited { retry_after });
        }
        if !status.success() {
            return Err(ModelError::Request(format!(
                "model command exited with {status}: {}",
                last_line.trim()
            )));
        }

        Ok(Reply::complete(String::from_utf8_lossy(&received)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandModel {
        CommandModel::new(
            vec!["sh".into(), "-c".into(), script.into()],
            Interrupt::new(),
        )
    }

    #[test]
    fn test_streams_stdout_as_reply() {
        let mut m = sh("cat > /dev/null; printf 'src/a.py\\nok'");
        let reply = m.complete("gpt-4", &[Message::user("hi")], true).unwrap();
        assert_eq!(reply, Reply::complete("src/a.py\nok"));
    }

    #[test]
    fn test_request_json_reaches_stdin() {
        let mut m = sh("cat");
        let reply = m.complete("gpt-4", &[Message::user("hi")], true).unwrap();
        let v: serde_json::Value = serde_json::from_str(&reply.content).unwrap();
        assert_eq!(v["model"], "gpt-4");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_tempfail_is_rate_limit() {
        let mut m = sh("cat > /dev/null; echo 'slow down' >&2; echo 2 >&2; exit 75");
        match m.complete("gpt-4", &[], true) {
            Err(ModelError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(2))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failure_carries_stderr() {
        let mut m = sh("cat > /dev/null; echo 'bad key' >&2; exit 1");
        let err = m.complete("gpt-4", &[], true).unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_interrupt_kills_child() {
        let mut m = sh("cat > /dev/null; printf partial; sleep 30");
        m.interrupt.trigger();
        let reply = m.complete("gpt-4", &[], true).unwrap();
        assert!(reply.interrupted);
        assert!(!m.interrupt.is_set());
    }

    #[test]
    fn test_empty_command_is_not_configured() {
        let mut m = CommandModel::new(Vec::new(), Interrupt::new());
        assert!(matches!(
            m.complete("gpt-4", &[], true),
            Err(ModelError::NotConfigured)
        ));
    }
}
