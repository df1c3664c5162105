//! Command-driven acquisition
//!
//! Runs an external login program (typically browser automation) and reads
//! the token it leaves behind.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{AcquiredCredential, CredentialAcquirer};
use crate::error::AcquisitionError;

const STDERR_TAIL_CHARS: usize = 500;

/// Acquirer backed by an external login program.
///
/// After a zero exit, the token is taken from the JSON token file when one is
/// configured (`token_extraction.token`, then `extraction_result.token`),
/// otherwise from the last JWT-shaped word on stdout.
#[derive(Debug, Clone)]
pub struct CommandCredentialAcquirer {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    token_file: Option<PathBuf>,
}

impl CommandCredentialAcquirer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            token_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// JSON file the login program writes its result to.
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    async fn read_token_file(
        &self,
        path: &Path,
    ) -> Result<Option<AcquiredCredential>, AcquisitionError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Token file not readable");
                return Ok(None);
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(document) => extract_from_document(&document),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Token file is not valid JSON");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CredentialAcquirer for CommandCredentialAcquirer {
    async fn acquire(&self, timeout: Duration) -> Result<AcquiredCredential, AcquisitionError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        info!(program = %self.program, timeout_secs = timeout.as_secs(), "Starting login command");

        let child = command.spawn().map_err(|e| AcquisitionError::Failed {
            message: format!("failed to start '{}': {}", self.program, e),
        })?;

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AcquisitionError::Failed {
                    message: format!("failed to wait for '{}': {}", self.program, e),
                })
            }
            Err(_) => {
                warn!(program = %self.program, "Login command timed out, killed");
                return Err(AcquisitionError::Timeout { timeout });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(AcquisitionError::Failed {
                message: format!(
                    "login command exited with {}: {}",
                    output.status,
                    tail(stderr.trim(), STDERR_TAIL_CHARS)
                ),
            });
        }

        if let Some(path) = &self.token_file {
            if let Some(acquired) = self.read_token_file(path).await? {
                return Ok(acquired);
            }
        }

        last_jwt(&stdout)
            .map(|token| AcquiredCredential::new(token, "command"))
            .ok_or(AcquisitionError::MissingToken)
    }
}

/// Pull the token out of a login result document.
fn extract_from_document(document: &Value) -> Result<Option<AcquiredCredential>, AcquisitionError> {
    let extraction = document
        .get("token_extraction")
        .filter(|v| v.is_object())
        .or_else(|| document.get("extraction_result").filter(|v| v.is_object()));
    let Some(extraction) = extraction else {
        return Ok(None);
    };

    let token = extraction
        .get("token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match token {
        Some(token) => {
            let source = extraction
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("command");
            Ok(Some(AcquiredCredential::new(token, source)))
        }
        None => match extraction.get("error").and_then(Value::as_str) {
            Some(error) => Err(AcquisitionError::Failed {
                message: error.to_string(),
            }),
            None => Ok(None),
        },
    }
}

fn last_jwt(output: &str) -> Option<&str> {
    output
        .split_whitespace()
        .rev()
        .map(|word| word.trim_matches(|c: char| c == '"' || c == '\''))
        .find(|word| looks_like_jwt(word))
}

fn looks_like_jwt(word: &str) -> bool {
    let segments: Vec<&str> = word.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '='))
        })
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}
