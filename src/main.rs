use anyhow::Context;
use clap::Parser;
use tokio::io::{BufReader, stdin, stdout};

use runner::config::{CliArgs, Config, Source};
use runner::executor::JobExecutor;
use runner::session;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries results only; logs go to stderr
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));

    let cli = CliArgs::parse();
    let Config { source, executor } = cli.to_config().context("Failed to load configuration")?;

    let executor = JobExecutor::new(executor);
    log::debug!("Executor options: {:?}", executor.options());
    let mut out = stdout();

    match source {
        Source::Stream => {
            let processed = session::run_stream(&executor, BufReader::new(stdin()), &mut out).await?;
            log::info!("Input exhausted after {processed} request(s), shutting down");
        }
        Source::Args {
            command,
            input,
            timeout,
        } => {
            session::run_once(&executor, command, input, timeout, &mut out).await?;
        }
    }

    // Child failures are reported in-band; the runner itself exits 0
    Ok(())
}
