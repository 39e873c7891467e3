//! SDR TCP Server
//!
//! Opens the receiver, starts it at the startup frequency and serves one
//! rtl_tcp client at a time.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sdr_tcp_bridge::{
    config::AppConfig,
    constants::*,
    controller::{RadioControl, RadioController},
    device::{RspModel, SimulatedApi},
    errorlog::ErrorLog,
    network::StreamingServer,
    sample::{create_shared_buffer, SamplePipeline},
    worker::HardwareWorker,
};

#[derive(Parser, Debug)]
#[command(name = "sdr-tcp-server")]
#[command(about = "Serve SDR I/Q samples over the rtl_tcp protocol")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// TCP port
    #[arg(short = 'p', long, env = "SDR_TCP_PORT")]
    port: Option<u16>,

    /// Receiver model: rsp1, rsp1a, rsp1b, rsp2, rspduo, rspdx, rspdxr2
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Frequency to start the receiver at, in Hz
    #[arg(short = 'f', long)]
    frequency: Option<u32>,

    /// Append fatal errors to this file
    #[arg(long)]
    error_log: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(address) = cli.address {
        config.network.bind_address = address;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(model) = cli.model {
        config.device.model = model;
    }
    if let Some(frequency) = cli.frequency {
        config.device.startup_frequency_hz = frequency;
    }
    config.validate()?;

    tracing::info!("Starting {}", VERSION_TAG);

    let model = RspModel::parse(&config.device.model)
        .with_context(|| format!("unknown receiver model '{}'", config.device.model))?;
    let error_log = Arc::new(match cli.error_log {
        Some(path) => ErrorLog::with_file(path),
        None => ErrorLog::new(),
    });

    let buffer = create_shared_buffer(config.stream.buffer_capacity);
    let pipeline = SamplePipeline::shared(buffer, model.bit_depth(), config.stream.chunk_samples);

    let settings = config.device.settings();
    let worker = HardwareWorker::start(
        Box::new(SimulatedApi::new(model)),
        settings.clone(),
        Arc::clone(&pipeline),
        Arc::clone(&error_log),
        &config.worker,
    )
    .with_context(|| format!("{} could not start the receiver", VERSION_TAG))?;

    let radio = RadioController::shared(worker, Arc::clone(&pipeline), settings.frequency);
    tracing::info!("Device: {}", radio.device_name());

    if !radio.start_streaming(settings.frequency, config.device.sample_rate_hz) {
        tracing::warn!(
            "Receiver did not start at {} Hz, {} S/s",
            settings.frequency,
            config.device.sample_rate_hz
        );
    }

    let control: Arc<dyn RadioControl> = radio.clone();
    let server = StreamingServer::bind(&config.network, &config.stream, control, Arc::clone(&pipeline))?;
    let stats = server.stats();

    // Periodic stats logging
    let stats_pipeline = Arc::clone(&pipeline);
    let stats_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let buffer = stats_pipeline.buffer();
            tracing::info!("Stats: {}", stats.snapshot());
            tracing::info!(
                "Samples: {} in, {} buffered, buffer {:.0}% ({} overflows, {} underruns, {} flushes)",
                stats_pipeline.samples_in(),
                stats_pipeline.samples_buffered(),
                buffer.fill_level() * 100.0,
                buffer.overflow_count(),
                buffer.underrun_count(),
                buffer.flush_count()
            );
        }
    });

    tracing::info!("Press Ctrl+C to stop");
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    stats_task.abort();
    tokio::task::spawn_blocking(move || radio.shutdown()).await?;
    Ok(())
}
