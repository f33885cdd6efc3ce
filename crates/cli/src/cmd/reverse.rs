//! Echo reversed chunks back to a TCP client
//!
//! Accepts a single connection. Everything the client sends is read in
//! fixed-size chunks, reversed and written both back to the client and to
//! stdout. The pipeline ends when the client closes its side.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Args;
use pipekit_codec::PassThrough;
use pipekit_config::Config;
use pipekit_pipeline::{NopClose, Pipeline, process_fn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{RunArgs, pipeline_config, shutdown_token, summarize};

#[derive(Args, Debug)]
pub struct ReverseArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5001)]
    pub port: u16,

    /// Bytes read per chunk (defaults to runtime.read_buffer_size)
    #[arg(long, value_name = "BYTES")]
    pub buffer_size: Option<usize>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Reverse a chunk, keeping a trailing newline at the end
pub fn reverse_chunk(mut chunk: Vec<u8>) -> Vec<u8> {
    let newline = chunk.last() == Some(&b'\n');
    if newline {
        chunk.pop();
    }
    chunk.reverse();
    if newline {
        chunk.push(b'\n');
    }
    chunk
}

pub async fn run(args: ReverseArgs, config: &Config) -> Result<()> {
    let addr = format!("{}:{}", args.bind, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let buffer_size = args.buffer_size.unwrap_or(config.runtime.read_buffer_size);
    serve(listener, buffer_size, config, shutdown_token(args.run.timeout())).await
}

async fn serve(
    listener: TcpListener,
    buffer_size: usize,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let local: SocketAddr = listener.local_addr().context("listener has no address")?;
    info!(addr = %local, "waiting for a connection");

    let (stream, peer) = tokio::select! {
        accepted = listener.accept() => accepted.context("accept failed")?,
        _ = cancel.cancelled() => {
            info!("cancelled before any client connected");
            return Ok(());
        }
    };
    info!(peer = %peer, "client connected");

    let (read, write) = stream.into_split();

    let mut pipeline = Pipeline::new(
        "reverse",
        process_fn(|chunk: Vec<u8>| async move { Ok(reverse_chunk(chunk)) }),
    );
    pipeline
        .set_config(pipeline_config(&config.runtime))
        .add_reader(read, PassThrough, buffer_size.max(1))
        .add_writer(write, PassThrough)
        .add_writer(NopClose::new(tokio::io::stdout()), PassThrough);

    let report = pipeline.run(cancel).await;
    summarize(&[report])
}
