//! embms MCE node
//!
//! Main binary for the MBMS Coordination Entity. It implements:
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Task spawning and lifecycle management
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! embms-mce -c config/mce.yaml
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use embms_common::logging::{init_logging, LogLevel};
use embms_common::load_mce_config;
use embms_mce::{M2apTask, MceTaskBase, SctpTask, Task, DEFAULT_CHANNEL_CAPACITY};

/// embms MCE - MBMS Coordination Entity
#[derive(Parser, Debug)]
#[command(name = "embms-mce")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the MCE configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info")]
    log_level: LogLevel,
}

async fn run(args: Args) -> Result<()> {
    info!("Loading configuration from: {}", args.config_file);
    let config = load_mce_config(&args.config_file)
        .with_context(|| format!("failed to load configuration from {}", args.config_file))?;
    info!(
        "Configuration loaded: MCE id {}, M2 endpoint {}:{}, {} PLMN(s), {} service area(s)",
        config.mce_id,
        config.m2ap_ip,
        config.m2ap_port,
        config.plmns.len(),
        config.mbms_service_areas.len()
    );

    let (task_base, m2ap_rx, sctp_rx) = MceTaskBase::new(config, DEFAULT_CHANNEL_CAPACITY);

    let mut sctp_task = SctpTask::bind(task_base.clone())
        .await
        .context("failed to bind the M2 SCTP endpoint")?;
    let sctp_handle = tokio::spawn(async move {
        sctp_task.run(sctp_rx).await;
    });
    info!("SCTP task spawned");

    let mut m2ap_task = M2apTask::new(task_base.clone());
    let m2ap_handle = tokio::spawn(async move {
        m2ap_task.run(m2ap_rx).await;
    });
    info!("M2AP task spawned");

    info!("MCE started, waiting for shutdown signal...");
    signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, initiating shutdown...");

    let _ = task_base.m2ap_tx.shutdown().await;
    let _ = task_base.sctp_tx.shutdown().await;
    let _ = m2ap_handle.await;
    let _ = sctp_handle.await;
    info!("MCE stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
