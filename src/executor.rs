mod artifact;
mod process;

use std::fs::File;
use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use tokio::time::timeout;

use crate::config::{CaptureMode, ExecutorOptions};
use crate::job::{CapturedOutput, JobRequest, JobResult};

/// Runs one job at a time and turns every outcome into a [`JobResult`]
///
/// The executor is configured once per runner process; capture mode and
/// stderr reporting cover every runner variant (file or pipe output, with
/// or without stderr).
#[derive(Debug, Clone)]
pub struct JobExecutor {
    options: ExecutorOptions,
}

impl JobExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Executes a single job to completion or timeout
    ///
    /// Never fails: setup and wait errors come back as `RuntimeError`. When
    /// this returns, the child has been reaped and, on timeout, its whole
    /// process group has been killed.
    pub async fn execute(&self, request: &JobRequest) -> JobResult {
        log::debug!(
            "Running {:?} with input {} (timeout {:?})",
            request.command(),
            request.input().display(),
            request.timeout()
        );

        let result = match self.try_execute(request).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Job `{}` failed to run: {e:#}", request.program());
                JobResult::runtime_error(format!("{e:#}"))
            }
        };

        log::info!("Job `{}` finished: {}", request.program(), result.kind());
        result
    }

    async fn try_execute(&self, request: &JobRequest) -> Result<JobResult> {
        artifact::ensure_output_dir(&self.options.output_dir)?;

        let input = File::open(request.input()).with_context(|| {
            format!("Failed to open input file {}", request.input().display())
        })?;
        // Opening a directory succeeds on Linux, reading it does not
        if input.metadata()?.is_dir() {
            bail!(
                "Failed to open input file {}: is a directory",
                request.input().display()
            );
        }

        let (stdout, artifact_path) = match self.options.capture {
            CaptureMode::File => {
                let (path, file) = artifact::create_artifact(&self.options.output_dir)?;
                (Stdio::from(file), Some(path))
            }
            CaptureMode::Pipe => (Stdio::piped(), None),
        };
        let stderr = if self.options.report_stderr {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };

        let start = Instant::now();
        let mut child = process::spawn_in_group(request.command(), input.into(), stdout, stderr)?;
        let pgid = child
            .id()
            .ok_or_else(|| anyhow!("Spawned process has no pid"))?;

        let completion = match timeout(request.timeout(), process::collect(&mut child)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                process::terminate_group(&mut child, pgid, self.options.grace_period).await;
                return Err(e);
            }
            Err(_) => {
                log::warn!(
                    "Job `{}` exceeded {:?}, killing process group {pgid}",
                    request.program(),
                    request.timeout()
                );
                process::terminate_group(&mut child, pgid, self.options.grace_period).await;
                return Ok(JobResult::Timeout);
            }
        };
        let elapsed = start.elapsed();

        if let Some(message) = completion.failure_message() {
            let stderr = self
                .options
                .report_stderr
                .then(|| String::from_utf8_lossy(&completion.stderr).into_owned());
            return Ok(JobResult::RuntimeError { message, stderr });
        }

        let output = match artifact_path {
            Some(path) => CapturedOutput::File { path },
            None => CapturedOutput::Pipe {
                output: String::from_utf8_lossy(&completion.stdout).into_owned(),
            },
        };

        Ok(JobResult::Success {
            output,
            time: elapsed.as_secs_f64(),
        })
    }
}
