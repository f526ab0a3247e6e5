use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, ValueEnum};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "runner", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Read base64-encoded job requests from stdin, one per line
    #[arg(long, short = 's', conflicts_with_all = ["timeout", "input"])]
    pub stream: bool,

    /// Time budget for the command, in seconds
    #[arg(long, short = 't', required_unless_present = "stream")]
    pub timeout: Option<f64>,

    /// Path to a JSON configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,

    /// Where the child's standard output is captured
    #[arg(long, value_enum)]
    pub capture: Option<CaptureMode>,

    /// Capture the child's standard error and include it in error results
    #[arg(long, default_value_t = false)]
    pub report_stderr: bool,

    /// Directory receiving output artifacts
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File bound to the child's standard input
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Program and arguments to run
    #[arg(
        required_unless_present = "stream",
        conflicts_with = "stream",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 1..
    )]
    pub command: Vec<String>,
}

impl CliArgs {
    /// Resolve the effective configuration: CLI flags over the config file over defaults
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let file_config = match &self.config_path {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };

        let source = if self.stream {
            Source::Stream
        } else {
            Source::Args {
                command: self.command.clone(),
                input: self.input.clone().unwrap_or(file_config.input),
                timeout: self
                    .timeout
                    .ok_or_else(|| anyhow!("--timeout is required unless --stream is given"))?,
            }
        };

        // stderr reporting defaults to on when streaming, off for a single job
        let report_stderr = self.report_stderr || file_config.report_stderr.unwrap_or(self.stream);

        let executor = ExecutorOptions {
            output_dir: self.output_dir.clone().unwrap_or(file_config.output_dir),
            capture: self.capture.unwrap_or(file_config.capture),
            report_stderr,
            grace_period: Duration::from_millis(file_config.grace_period.0),
        };

        Ok(Config { source, executor })
    }
}

/// Effective configuration of one runner process
#[derive(Debug)]
pub struct Config {
    pub source: Source,
    pub executor: ExecutorOptions,
}

/// Where job requests come from
#[derive(Debug, PartialEq)]
pub enum Source {
    /// Base64 JSON lines on stdin until EOF
    Stream,
    /// A single job described on the command line
    Args {
        command: Vec<String>,
        input: PathBuf,
        timeout: f64,
    },
}

/// Knobs of the job executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub output_dir: PathBuf,
    pub capture: CaptureMode,
    pub report_stderr: bool,
    /// Time between SIGTERM and SIGKILL when a job times out
    pub grace_period: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        let defaults = RunnerConfig::default();
        Self {
            output_dir: defaults.output_dir,
            capture: defaults.capture,
            report_stderr: false,
            grace_period: Duration::from_millis(defaults.grace_period.0),
        }
    }
}

#[derive(Deserialize, ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Redirect stdout into a fresh artifact file and report its path
    #[default]
    File,
    /// Collect stdout through a pipe and report it inline
    Pipe,
}

/// Contents of the optional JSON configuration file
#[derive(Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub output_dir: PathBuf,
    pub input: PathBuf,
    pub capture: CaptureMode,
    pub report_stderr: Option<bool>,
    pub grace_period: MilliSecond,
}

#[derive(Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl Default for RunnerConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        Self {
            output_dir: temp_dir.join("outputs"),
            input: temp_dir.join("input.txt"),
            capture: CaptureMode::File,
            report_stderr: None,
            grace_period: MilliSecond(500),
        }
    }
}

impl RunnerConfig {
    /// Load the configuration from the specified file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}
