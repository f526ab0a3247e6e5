use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{self, LineEncoding};
use crate::executor::JobExecutor;
use crate::job::{JobRequest, JobResult};

/// Serves base64 requests from `reader` until EOF, one result line per request line
///
/// A malformed or failing request only affects its own result line. Returns
/// the number of lines processed; errors come only from the channel itself.
pub async fn run_stream<R, W>(executor: &JobExecutor, mut reader: R, writer: &mut W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();
    let mut processed = 0;

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .context("Failed to read request line")?;
        if n == 0 {
            break;
        }
        processed += 1;

        let result = match codec::decode_request(&line) {
            Ok(request) => executor.execute(&request).await,
            Err(e) => {
                log::warn!("Rejected request line {processed}: {e:#}");
                JobResult::runtime_error(format!("{e:#}"))
            }
        };

        write_result(writer, &result, LineEncoding::Base64).await?;
    }

    Ok(processed)
}

/// Runs the single job described on the command line and prints a plain JSON result
pub async fn run_once<W>(
    executor: &JobExecutor,
    command: Vec<String>,
    input: PathBuf,
    timeout: f64,
    writer: &mut W,
) -> Result<JobResult>
where
    W: AsyncWrite + Unpin,
{
    let result = match JobRequest::new(command, input, timeout) {
        Ok(request) => executor.execute(&request).await,
        Err(e) => {
            log::warn!("Rejected job: {e:#}");
            JobResult::runtime_error(format!("{e:#}"))
        }
    };

    write_result(writer, &result, LineEncoding::Plain).await?;
    Ok(result)
}

async fn write_result<W>(writer: &mut W, result: &JobResult, encoding: LineEncoding) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = codec::encode_result(result, encoding)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("Failed to write result line")?;
    writer.flush().await.context("Failed to flush result line")
}
