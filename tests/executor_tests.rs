use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use runner::config::{CaptureMode, ExecutorOptions};
use runner::executor::JobExecutor;
use runner::job::{CapturedOutput, JobRequest, JobResult};

// Helper to build an executor writing into a private temp directory
fn executor(dir: &TempDir, capture: CaptureMode, report_stderr: bool) -> JobExecutor {
    JobExecutor::new(ExecutorOptions {
        output_dir: dir.path().join("outputs"),
        capture,
        report_stderr,
        grace_period: Duration::from_millis(200),
    })
}

fn input_file(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("input.txt");
    fs::write(&path, content).unwrap();
    path
}

fn shell(script: &str, input: &Path, timeout: f64) -> JobRequest {
    JobRequest::new(
        vec!["sh".into(), "-c".into(), script.into()],
        input,
        timeout,
    )
    .unwrap()
}

fn artifact_path(result: &JobResult) -> PathBuf {
    match result {
        JobResult::Success {
            output: CapturedOutput::File { path },
            ..
        } => path.clone(),
        other => panic!("expected file success, got {other:?}"),
    }
}

// Dead means no /proc entry, or a zombie waiting for its new parent to reap it
fn process_is_dead(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
    }
}

#[tokio::test]
async fn test_echo_hello_writes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let executor = executor(&dir, CaptureMode::File, false);

    let request = JobRequest::from_shell("echo hello", &input, 5.0).unwrap();
    let result = executor.execute(&request).await;

    let path = artifact_path(&result);
    assert!(path.starts_with(dir.path().join("outputs")));
    assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    let JobResult::Success { time, .. } = result else {
        unreachable!()
    };
    assert!((0.0..1.0).contains(&time), "unexpected time {time}");
}

#[tokio::test]
async fn test_input_file_feeds_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "3 4\nline two\n");
    let executor = executor(&dir, CaptureMode::File, true);

    let request = JobRequest::from_shell("cat", &input, 5.0).unwrap();
    let result = executor.execute(&request).await;
    assert_eq!(
        fs::read_to_string(artifact_path(&result)).unwrap(),
        "3 4\nline two\n"
    );
}

#[tokio::test]
async fn test_repeated_job_gets_fresh_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let executor = executor(&dir, CaptureMode::File, false);
    let request = JobRequest::from_shell("echo again", &input, 5.0).unwrap();

    let first = artifact_path(&executor.execute(&request).await);
    let second = artifact_path(&executor.execute(&request).await);
    assert_ne!(first, second);
    assert_eq!(fs::read_to_string(&first).unwrap(), "again\n");
    assert_eq!(fs::read_to_string(&second).unwrap(), "again\n");
}

#[tokio::test]
async fn test_pipe_capture_reports_stdout_inline() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "piped");
    let executor = executor(&dir, CaptureMode::Pipe, false);

    let result = executor.execute(&shell("cat; echo", &input, 5.0)).await;
    match result {
        JobResult::Success { output, .. } => assert_eq!(
            output,
            CapturedOutput::Pipe {
                output: "piped\n".into()
            }
        ),
        other => panic!("unexpected result {other:?}"),
    }
    // Nothing is written to the output directory in pipe mode
    assert_eq!(fs::read_dir(dir.path().join("outputs")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_sleep_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let executor = executor(&dir, CaptureMode::File, true);

    let start = Instant::now();
    let request = JobRequest::from_shell("sleep 10", &input, 1.0).unwrap();
    assert_eq!(executor.execute(&request).await, JobResult::Timeout);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_kills_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let pid_file = dir.path().join("grandchild.pid");
    let executor = executor(&dir, CaptureMode::File, false);

    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
    let result = executor.execute(&shell(&script, &input, 0.5)).await;
    assert_eq!(result, JobResult::Timeout);

    let pid: u32 = fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !process_is_dead(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(process_is_dead(pid), "grandchild {pid} outlived the timeout");
}

#[tokio::test]
async fn test_nonzero_exit_reports_code_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let executor = executor(&dir, CaptureMode::File, true);

    let result = executor
        .execute(&shell("echo partial; echo 'bad input' >&2; exit 3", &input, 5.0))
        .await;
    assert_eq!(
        result,
        JobResult::RuntimeError {
            message: "Process exited with error code 3".into(),
            stderr: Some("bad input\n".into()),
        }
    );
}

#[tokio::test]
async fn test_false_without_stderr_reporting() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let executor = executor(&dir, CaptureMode::File, false);

    let request = JobRequest::new(vec!["false".into()], &input, 5.0).unwrap();
    assert_eq!(
        executor.execute(&request).await,
        JobResult::runtime_error("Process exited with error code 1")
    );
}

#[tokio::test]
async fn test_missing_executable_is_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let executor = executor(&dir, CaptureMode::File, true);

    let request = JobRequest::new(vec!["no-such-binary-7731".into()], &input, 5.0).unwrap();
    match executor.execute(&request).await {
        JobResult::RuntimeError { message, stderr } => {
            assert!(message.contains("Failed to spawn `no-such-binary-7731`"));
            assert_eq!(stderr, None);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_input_is_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = executor(&dir, CaptureMode::File, false);

    let missing = dir.path().join("nope.in");
    let request = JobRequest::from_shell("cat", &missing, 5.0).unwrap();
    match executor.execute(&request).await {
        JobResult::RuntimeError { message, .. } => {
            assert!(message.starts_with("Failed to open input file"));
            assert!(message.contains("nope.in"));
        }
        other => panic!("unexpected result {other:?}"),
    }
    // The directory is bootstrapped, but no artifact is left behind
    assert_eq!(fs::read_dir(dir.path().join("outputs")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_directory_input_is_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = executor(&dir, CaptureMode::File, false);

    let request = JobRequest::new(vec!["true".into()], dir.path(), 5.0).unwrap();
    match executor.execute(&request).await {
        JobResult::RuntimeError { message, .. } => {
            assert!(message.starts_with("Failed to open input file"));
            assert!(message.ends_with("is a directory"));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(fs::read_dir(dir.path().join("outputs")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_output_dir_created_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let input = input_file(&dir, "");
    let nested = dir.path().join("a").join("b").join("outputs");
    let executor = JobExecutor::new(ExecutorOptions {
        output_dir: nested.clone(),
        ..ExecutorOptions::default()
    });

    let request = JobRequest::from_shell("true", &input, 5.0).unwrap();
    let path = artifact_path(&executor.execute(&request).await);
    assert!(nested.is_dir());
    assert_eq!(path.parent(), Some(nested.as_path()));
}
