use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Everything observed from a child that exited on its own
#[derive(Debug)]
pub(super) struct Completion {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Completion {
    /// Describes a failing exit status, `None` when the child succeeded
    pub fn failure_message(&self) -> Option<String> {
        if self.status.success() {
            return None;
        }
        Some(match (self.status.code(), self.status.signal()) {
            (Some(code), _) => format!("Process exited with error code {code}"),
            (None, Some(signal)) => format!("Process terminated by signal {signal}"),
            (None, None) => format!("Process exited abnormally: {}", self.status),
        })
    }
}

/// Spawns `command` as the leader of a new process group
///
/// The group id equals the returned child's pid, which lets a timeout take
/// down every descendant at once.
pub(super) fn spawn_in_group(
    command: &[String],
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
) -> Result<Child> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("Empty command"))?;

    let mut std_cmd = std::process::Command::new(program);
    std_cmd
        .args(args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0);

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    cmd.spawn()
        .with_context(|| format!("Failed to spawn `{program}`"))
}

/// Waits for the child to exit while draining whichever pipes it has
///
/// Reading the pipes concurrently with the wait keeps a chatty child from
/// blocking on a full pipe buffer.
pub(super) async fn collect(child: &mut Child) -> Result<Completion> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, stdout, stderr) = tokio::try_join!(
        async {
            child
                .wait()
                .await
                .context("Failed to wait for child process")
        },
        read_pipe(stdout),
        read_pipe(stderr),
    )?;

    Ok(Completion {
        status,
        stdout,
        stderr,
    })
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)
            .await
            .context("Failed to read child output")?;
    }
    Ok(buf)
}

/// Tears down the process group led by `pgid` and reaps the leader
///
/// SIGTERM goes to the whole group first; after `grace` the group gets
/// SIGKILL whether or not the leader already exited, since descendants may
/// ignore SIGTERM or outlive their parent.
pub(super) async fn terminate_group(child: &mut Child, pgid: u32, grace: Duration) {
    signal_group(pgid, libc::SIGTERM);
    if timeout(grace, child.wait()).await.is_err() {
        log::debug!("Process group {pgid} survived SIGTERM for {grace:?}");
    }
    signal_group(pgid, libc::SIGKILL);

    if let Err(e) = child.wait().await {
        log::error!("Failed to reap process {pgid}: {e}");
    }
}

fn signal_group(pgid: u32, signal: libc::c_int) {
    // A negative pid addresses every member of the group
    let ret = unsafe { libc::kill(-(pgid as libc::pid_t), signal) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already gone
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("Failed to send signal {signal} to process group {pgid}: {err}");
        }
    }
}
