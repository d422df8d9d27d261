//! Runtime configuration for ckpt-reshard.
//!
//! Every knob has a CLI flag; the defaults reproduce a plain
//! fixed-constant run (5 GB device ceiling, 500 MB shards).

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum free VRAM required before a conversion is attempted.
/// Binary GiB: the guard compares raw byte counts from the runtime.
pub const MIN_FREE_VRAM: u64 = 4 * 1024 * 1024 * 1024;

/// Number of load attempts before the run is declared failed.
pub const MAX_LOAD_ATTEMPTS: u32 = 3;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ckpt-reshard",
    about = "Convert a causal-LM checkpoint to sharded float16 safetensors"
)]
pub struct Cli {
    /// Input checkpoint directory (config.json + safetensors weights).
    #[arg(short, long, default_value = "./model")]
    pub input: PathBuf,

    /// Output directory for the converted checkpoint.
    #[arg(short, long, default_value = "./model-f16")]
    pub output: PathBuf,

    /// Device memory ceiling for resident weights (e.g. "5GB").
    #[arg(long, default_value = "5GB", value_parser = parse_size)]
    pub device_memory: u64,

    /// Maximum size of a single weight shard (e.g. "500MB").
    #[arg(long, default_value = "500MB", value_parser = parse_size)]
    pub max_shard_size: u64,

    /// Scratch directory for tensors spilled past the memory ceiling.
    #[arg(long, default_value = "./offload_temp")]
    pub offload_dir: PathBuf,

    /// Log file (appended alongside console output).
    #[arg(long, default_value = "conversion.log")]
    pub log_file: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Resolved configuration for one conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Input checkpoint directory.
    pub input_dir: PathBuf,

    /// Output directory.
    pub output_dir: PathBuf,

    /// Device memory ceiling in bytes.
    pub device_memory: u64,

    /// Maximum shard size in bytes.
    pub max_shard_size: u64,

    /// Offload scratch directory.
    pub offload_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./model"),
            output_dir: PathBuf::from("./model-f16"),
            device_memory: 5_000_000_000,
            max_shard_size: 500_000_000,
            offload_dir: PathBuf::from("./offload_temp"),
        }
    }
}

impl Config {
    /// Build a config from parsed CLI arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            input_dir: cli.input.clone(),
            output_dir: cli.output.clone(),
            device_memory: cli.device_memory,
            max_shard_size: cli.max_shard_size,
            offload_dir: cli.offload_dir.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("empty size string")]
    Empty,

    #[error("invalid size string: {0:?}")]
    Invalid(String),
}

/// Parse a human-readable size string into bytes.
///
/// Decimal units (`KB`, `MB`, `GB`, `TB`) multiply by powers of 1000,
/// binary units (`KiB`, `MiB`, `GiB`, `TiB`) by powers of 1024, matching
/// the convention of Hugging Face `max_shard_size` strings. A bare integer
/// is taken as bytes. Case-insensitive.
pub fn parse_size(s: &str) -> Result<u64, SizeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SizeError::Empty);
    }

    let lower = s.to_ascii_lowercase();
    let (digits, multiplier) = if let Some(num) = lower.strip_suffix("kib") {
        (num, 1u64 << 10)
    } else if let Some(num) = lower.strip_suffix("mib") {
        (num, 1u64 << 20)
    } else if let Some(num) = lower.strip_suffix("gib") {
        (num, 1u64 << 30)
    } else if let Some(num) = lower.strip_suffix("tib") {
        (num, 1u64 << 40)
    } else if let Some(num) = lower.strip_suffix("kb") {
        (num, 1_000)
    } else if let Some(num) = lower.strip_suffix("mb") {
        (num, 1_000_000)
    } else if let Some(num) = lower.strip_suffix("gb") {
        (num, 1_000_000_000)
    } else if let Some(num) = lower.strip_suffix("tb") {
        (num, 1_000_000_000_000)
    } else {
        (lower.as_str(), 1)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| SizeError::Invalid(s.to_string()))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| SizeError::Invalid(s.to_string()))
}
