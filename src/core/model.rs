//! Model capability seam
//!
//! The engine talks to language models only through [`ModelClient`]. A reply
//! carries the text received so far and whether the receive was cancelled.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_upper(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::System => "SYSTEM",
        }
    }
}

/// One conversation turn as sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Completed or cancelled model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    /// The receive was cancelled; `content` holds the partial text
    pub interrupted: bool,
}

impl Reply {
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            interrupted: false,
        }
    }

    pub fn interrupted(partial: impl Into<String>) -> Self {
        Self {
            content: partial.into(),
            interrupted: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Transient; the caller waits `retry_after` and tries again
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("no model command configured")]
    NotConfigured,

    #[error("model request failed: {0}")]
    Request(String),

    #[error("model transport I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ModelClient {
    /// Send `messages` to `model`. Unless `silent`, output may be shown to
    /// the user while it streams in.
    fn complete(
        &mut self,
        model: &str,
        messages: &[Message],
        silent: bool,
    ) -> Result<Reply, ModelError>;
}

/// Complete with unbounded retries on rate limiting, honoring the delay the
/// service asked for.
pub fn send_with_retry(
    client: &mut dyn ModelClient,
    model: &str,
    messages: &[Message],
    silent: bool,
) -> Result<Reply, ModelError> {
    loop {
        match client.complete(model, messages, silent) {
            Err(ModelError::RateLimited { retry_after }) => {
                warn!(
                    model,
                    retry_after_secs = retry_after.as_secs_f64(),
                    "rate limit exceeded, retrying"
                );
                std::thread::sleep(retry_after);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        failures: usize,
        calls: usize,
    }

    impl ModelClient for Flaky {
        fn complete(&mut self, _: &str, _: &[Message], _: bool) -> Result<Reply, ModelError> {
            self.calls += 1;
            if self.calls <= self.failures {
                return Err(ModelError::RateLimited {
                    retry_after: Duration::ZERO,
                });
            }
            Ok(Reply::complete("done"))
        }
    }

    #[test]
    fn test_rate_limit_is_retried() {
        let mut client = Flaky {
            failures: 3,
            calls: 0,
        };
        let reply = send_with_retry(&mut client, "m", &[Message::user("hi")], true).unwrap();
        assert_eq!(reply.content, "done");
        assert_eq!(client.calls, 4);
    }

    #[test]
    fn test_other_errors_propagate() {
        struct Broken;
        impl ModelClient for Broken {
            fn complete(&mut self, _: &str, _: &[Message], _: bool) -> Result<Reply, ModelError> {
                Err(ModelError::Request("boom".into()))
            }
        }
        let err = send_with_retry(&mut Broken, "m", &[], true).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::assistant("Ok.")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"Ok."}"#);
    }
}
