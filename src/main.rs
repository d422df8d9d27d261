//! ckpt-reshard binary: parse flags, wire up logging, run one conversion.
//!
//! Exit code 0 on success, 1 on any conversion failure.

use std::fs::OpenOptions;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ckpt_reshard::config::{Cli, Config};
use ckpt_reshard::convert::driver::ConversionDriver;
use ckpt_reshard::convert::loader::SafetensorsSource;
use ckpt_reshard::gpu::device::GpuRuntime;

const REMEDIATION: &str = "\
recommended remediations:
  1. reduce --max-shard-size (e.g. 250MB)
  2. run on a device with more free VRAM
  3. lower --device-memory to force CPU/disk offload
  4. quantize to 8-bit before converting";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging: console plus append-mode log file.
    let filter = if cli.verbose {
        "ckpt_reshard=debug"
    } else {
        "ckpt_reshard=info"
    };

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    info!("ckpt-reshard v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_cli(&cli);
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        device_memory = config.device_memory,
        max_shard_size = config.max_shard_size,
        offload_dir = %config.offload_dir.display(),
        "configuration loaded"
    );

    let accel = GpuRuntime::detect();
    let source = SafetensorsSource::new(
        config.input_dir.clone(),
        config.device_memory,
        config.offload_dir.clone(),
    );
    let mut driver = ConversionDriver::new(source, accel, config);

    match driver.run() {
        Ok(report) => {
            info!(
                shards = report.shards,
                total_bytes = report.total_bytes,
                elapsed_secs = format_args!("{:.1}", report.elapsed.as_secs_f64()),
                "done"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "conversion failed");
            error!("{REMEDIATION}");
            std::process::exit(1);
        }
    }
}
