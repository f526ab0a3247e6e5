use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

/// A validated request to run one command against one input file
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    command: Vec<String>,
    input: PathBuf,
    timeout: Duration,
}

impl JobRequest {
    /// Builds a request from already tokenized command arguments
    ///
    /// Timeouts too large for a [`Duration`] saturate to `Duration::MAX`,
    /// which in practice means no deadline.
    pub fn new(command: Vec<String>, input: impl Into<PathBuf>, timeout_secs: f64) -> Result<Self> {
        if command.is_empty() {
            bail!("Command must contain at least one token");
        }
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            bail!("Timeout must be a positive number of seconds, got {timeout_secs}");
        }
        let timeout = Duration::try_from_secs_f64(timeout_secs).unwrap_or(Duration::MAX);

        Ok(Self {
            command,
            input: input.into(),
            timeout,
        })
    }

    /// Builds a request from a shell-style command string
    ///
    /// Tokenization follows POSIX shell word splitting: single quotes are
    /// literal, double quotes allow backslash escapes, unquoted `#` starts a
    /// comment. No expansion of any kind is performed.
    pub fn from_shell(command: &str, input: impl Into<PathBuf>, timeout_secs: f64) -> Result<Self> {
        let tokens = shlex::split(command)
            .ok_or_else(|| anyhow!("Unbalanced quoting in command: {command}"))?;
        Self::new(tokens, input, timeout_secs)
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn program(&self) -> &str {
        &self.command[0]
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Wire form of a request on the streaming channel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequestPayload {
    pub input: PathBuf,
    pub command: String,
    pub timeout: f64,
}

impl TryFrom<RequestPayload> for JobRequest {
    type Error = anyhow::Error;

    fn try_from(payload: RequestPayload) -> Result<Self> {
        Self::from_shell(&payload.command, payload.input, payload.timeout)
    }
}

/// Outcome of a single job, tagged by `type` on the wire
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobResult {
    Success {
        #[serde(flatten)]
        output: CapturedOutput,
        /// Wall clock seconds from spawn to exit
        time: f64,
    },
    RuntimeError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    Timeout,
}

/// Where the child's standard output ended up
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CapturedOutput {
    File {
        #[serde(rename = "outputContainerPath")]
        path: PathBuf,
    },
    Pipe {
        output: String,
    },
}

impl JobResult {
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::RuntimeError {
            message: message.into(),
            stderr: None,
        }
    }

    /// The wire tag, handy for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::RuntimeError { .. } => "runtime-error",
            Self::Timeout => "timeout",
        }
    }
}
