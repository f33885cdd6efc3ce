//! Subcommands and the plumbing they share

pub mod greet;
pub mod json;
pub mod lines;
pub mod reverse;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use pipekit_config::RuntimeConfig;
use pipekit_pipeline::{PipelineConfig, RunReport};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Arguments every subcommand accepts
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stop the pipelines after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl RunArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Pipeline tuning taken from the `[runtime]` config section
pub fn pipeline_config(runtime: &RuntimeConfig) -> PipelineConfig {
    PipelineConfig::default()
        .with_sink_queue_size(runtime.sink_queue_size)
        .with_close_timeout(runtime.shutdown_timeout())
}

/// Token cancelled on Ctrl+C, SIGTERM or when `timeout` elapses
pub fn shutdown_token(timeout: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = wait_for_signal() => info!("received shutdown signal"),
            _ = deadline => info!("run timeout elapsed"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });

    token
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Create (or truncate) an output file
pub async fn create_output(path: &Path) -> Result<File> {
    File::create(path)
        .await
        .with_context(|| format!("failed to create output file {}", path.display()))
}

/// Log each report and fail if any run ended with a fatal error or a panic
pub fn summarize(reports: &[RunReport]) -> Result<()> {
    for report in reports {
        info!(
            pipeline = %report.pipeline,
            reason = %report.reason,
            items_read = report.metrics.items_read,
            items_written = report.metrics.items_written,
            errors = report.metrics.total_errors(),
            sources_dropped = report.sources_dropped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
    }

    if let Some(report) = reports.iter().find(|r| r.fatal_error.is_some()) {
        anyhow::bail!(
            "pipeline {} failed: {}",
            report.pipeline,
            report.fatal_error.as_deref().unwrap_or_default()
        );
    }
    if let Some(report) = reports
        .iter()
        .find(|r| r.reason == pipekit_pipeline::StopReason::Panicked)
    {
        anyhow::bail!("pipeline {} panicked", report.pipeline);
    }
    Ok(())
}
