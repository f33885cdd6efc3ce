//! Decorate every line of one or more text files

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use pipekit_codec::Text;
use pipekit_config::Config;
use pipekit_io::DelimitedReader;
use pipekit_pipeline::{NopClose, Pipeline, process_fn};
use tracing::info;

use super::{RunArgs, create_output, pipeline_config, shutdown_token, summarize};

#[derive(Args, Debug)]
pub struct LinesArgs {
    /// Text files to read, each becomes its own source
    #[arg(value_name = "FILE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Also write decorated lines to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pause a random time up to this bound before emitting each line, so
    /// lines from different files interleave (0 disables the pause)
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    pub max_delay_ms: u64,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Random pause in `0..=max_ms` milliseconds
pub fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random_range(0..=max_ms))
}

pub fn decorate(line: &str) -> String {
    format!("XXXX {} XXXX\n", line.trim())
}

pub async fn run(args: LinesArgs, config: &Config) -> Result<()> {
    let max_delay_ms = args.max_delay_ms;

    let mut pipeline = Pipeline::new(
        "lines",
        process_fn(move |line: String| async move {
            let delay = jitter(max_delay_ms);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(decorate(&line))
        }),
    );
    pipeline.set_config(pipeline_config(&config.runtime));

    for input in &args.inputs {
        let reader = DelimitedReader::open(input)
            .await
            .with_context(|| format!("failed to open {}", input.display()))?
            .with_max_message_size(config.runtime.max_message_size);
        pipeline.add_message_source(reader, Text);
    }

    pipeline.add_writer(NopClose::new(tokio::io::stdout()), Text);
    if let Some(output) = &args.output {
        pipeline.add_writer(create_output(output).await?, Text);
    }

    info!(sources = pipeline.source_count(), sinks = pipeline.sink_count(), "starting lines pipeline");
    let report = pipeline.run(shutdown_token(args.run.timeout())).await;
    summarize(&[report])
}
