//! Conversion orchestration.
//!
//! One run walks guard → load (up to three attempts) → tokenizer → save.
//! The device cache is cleared between failed attempts, immediately after
//! a successful load, and once more during the cleanup that follows the
//! save on both its outcomes.

use std::fs;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MAX_LOAD_ATTEMPTS, MIN_FREE_VRAM};
use crate::convert::checkpoint::Checkpoint;
use crate::convert::loader::CheckpointSource;
use crate::convert::saver::{save_checkpoint, SaveError, SaveReport};
use crate::convert::tokenizer::{TokenizerAssets, TokenizerError};
use crate::gpu::device::Accelerator;
use crate::gpu::guard::vram_guard;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("insufficient free device memory to start conversion")]
    InsufficientVram,

    #[error("checkpoint load failed after {attempts} attempts")]
    LoadExhausted { attempts: u32 },

    #[error("tokenizer assets: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("save failed: {0}")]
    Save(#[from] SaveError),
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Weight shards written.
    pub shards: usize,

    /// Total tensor payload bytes written.
    pub total_bytes: u64,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Drives one conversion run over an injected checkpoint source and
/// accelerator runtime.
pub struct ConversionDriver<S, A> {
    source: S,
    accel: A,
    config: Config,
}

impl<S: CheckpointSource, A: Accelerator> ConversionDriver<S, A> {
    pub fn new(source: S, accel: A, config: Config) -> Self {
        Self {
            source,
            accel,
            config,
        }
    }

    /// Run the conversion to completion.
    pub fn run(&mut self) -> Result<ConversionReport, ConvertError> {
        let start = Instant::now();
        info!(
            input = %self.config.input_dir.display(),
            output = %self.config.output_dir.display(),
            device_memory = self.config.device_memory,
            max_shard_size = self.config.max_shard_size,
            "starting conversion"
        );

        if !vram_guard(&self.accel, MIN_FREE_VRAM) {
            error!("insufficient free device memory, aborting before load");
            return Err(ConvertError::InsufficientVram);
        }

        let checkpoint = 'load: {
            for attempt in 1..=MAX_LOAD_ATTEMPTS {
                info!(attempt, max = MAX_LOAD_ATTEMPTS, "load attempt");
                match self.source.load() {
                    Ok(ckpt) => break 'load ckpt,
                    Err(e) => {
                        error!(attempt, error = %e, "checkpoint load failed");
                        // Release whatever the failed attempt left cached
                        // before the next try.
                        self.accel.clear_cache();
                    }
                }
            }
            error!(attempts = MAX_LOAD_ATTEMPTS, "all load attempts exhausted");
            return Err(ConvertError::LoadExhausted {
                attempts: MAX_LOAD_ATTEMPTS,
            });
        };

        self.accel.clear_cache();
        info!(
            tensors = checkpoint.len(),
            total_bytes = checkpoint.total_bytes(),
            spilled_bytes = checkpoint.spilled_bytes(),
            "checkpoint resident in float16, device cache cleared"
        );

        let tokenizer = match TokenizerAssets::load(&self.config.input_dir) {
            Ok(assets) => assets,
            Err(e) => {
                error!(error = %e, "tokenizer assets unavailable");
                drop(checkpoint);
                self.cleanup();
                return Err(e.into());
            }
        };

        let save_result = self.save_phase(&checkpoint, &tokenizer);
        drop(checkpoint);
        self.cleanup();

        match save_result {
            Ok(report) => {
                let report = ConversionReport {
                    shards: report.shards,
                    total_bytes: report.total_bytes,
                    elapsed: start.elapsed(),
                };
                info!(
                    shards = report.shards,
                    total_bytes = report.total_bytes,
                    elapsed_secs = format_args!("{:.1}", report.elapsed.as_secs_f64()),
                    "conversion completed successfully"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "conversion did not complete");
                Err(e)
            }
        }
    }

    fn save_phase(
        &self,
        checkpoint: &Checkpoint,
        tokenizer: &TokenizerAssets,
    ) -> Result<SaveReport, ConvertError> {
        let report = save_checkpoint(
            checkpoint,
            &self.config.output_dir,
            self.config.max_shard_size,
        )?;
        tokenizer.save(&self.config.output_dir)?;
        Ok(report)
    }

    /// Final cleanup: clear the device cache and drop the offload scratch
    /// dir. Runs exactly once per run that loaded a checkpoint.
    fn cleanup(&self) {
        self.accel.clear_cache();
        if self.config.offload_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.config.offload_dir) {
                warn!(
                    dir = %self.config.offload_dir.display(),
                    error = %e,
                    "failed to remove offload scratch dir"
                );
            }
        }
        debug!("cleanup complete");
    }
}
