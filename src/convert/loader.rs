//! Safetensors checkpoint loading with float16 downcast.
//!
//! Input weight files are memory-mapped, so only one converted tensor is
//! materialized at a time. Converted tensors accumulate in RAM until the
//! device memory ceiling is reached; past it they spill to scratch files
//! in the offload dir.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::PathBuf;

use half::{bf16, f16};
use memmap2::Mmap;
use safetensors::{Dtype, SafeTensors};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::convert::checkpoint::{Checkpoint, TensorEntry, TensorPayload};

/// Name of the shard index a pre-sharded input checkpoint carries.
pub const INDEX_FILE: &str = "model.safetensors.index.json";

/// Single-file weight name.
pub const SINGLE_FILE: &str = "model.safetensors";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("missing config.json in {0:?}")]
    MissingConfig(PathBuf),

    #[error("no safetensors weight files found in {0:?}")]
    NoWeights(PathBuf),

    #[error("invalid shard index {file:?}: {message}")]
    InvalidIndex { file: PathBuf, message: String },

    #[error("safetensors parse error in {file:?}: {message}")]
    Parse { file: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces a loaded checkpoint; each call is one load attempt.
pub trait CheckpointSource {
    fn load(&mut self) -> Result<Checkpoint, LoadError>;
}

impl<T: CheckpointSource + ?Sized> CheckpointSource for &mut T {
    fn load(&mut self) -> Result<Checkpoint, LoadError> {
        (**self).load()
    }
}

/// Shard index layout of a pre-sharded input checkpoint.
#[derive(Debug, Deserialize)]
struct WeightIndex {
    weight_map: std::collections::BTreeMap<String, String>,
}

/// Loads a Hugging Face-style checkpoint directory (config.json plus one
/// or more safetensors files) and downcasts its weights to float16.
pub struct SafetensorsSource {
    input_dir: PathBuf,
    memory_ceiling: u64,
    offload_dir: PathBuf,
}

impl SafetensorsSource {
    pub fn new(input_dir: PathBuf, memory_ceiling: u64, offload_dir: PathBuf) -> Self {
        Self {
            input_dir,
            memory_ceiling,
            offload_dir,
        }
    }

    /// Weight files to read, in order.
    ///
    /// A shard index wins over a bare model.safetensors; failing both, any
    /// *.safetensors files in the directory are taken sorted by name.
    fn weight_files(&self) -> Result<Vec<PathBuf>, LoadError> {
        let index_path = self.input_dir.join(INDEX_FILE);
        if index_path.exists() {
            let data = fs::read(&index_path)?;
            let index: WeightIndex =
                serde_json::from_slice(&data).map_err(|e| LoadError::InvalidIndex {
                    file: index_path.clone(),
                    message: e.to_string(),
                })?;
            let files: BTreeSet<&String> = index.weight_map.values().collect();
            return Ok(files.into_iter().map(|f| self.input_dir.join(f)).collect());
        }

        let single = self.input_dir.join(SINGLE_FILE);
        if single.exists() {
            return Ok(vec![single]);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.input_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "safetensors"))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(LoadError::NoWeights(self.input_dir.clone()));
        }
        Ok(files)
    }

    /// Keep the converted tensor resident or spill it past the ceiling.
    fn place_tensor(
        &self,
        resident_bytes: &mut u64,
        index: usize,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<TensorPayload, LoadError> {
        let len = bytes.len() as u64;
        if *resident_bytes + len <= self.memory_ceiling {
            *resident_bytes += len;
            return Ok(TensorPayload::Resident(bytes));
        }

        fs::create_dir_all(&self.offload_dir)?;
        let file_name = format!("{index:05}_{}.bin", name.replace(['/', '\\'], "_"));
        let path = self.offload_dir.join(file_name);
        fs::write(&path, &bytes)?;
        debug!(tensor = name, path = %path.display(), len, "spilled tensor past memory ceiling");
        Ok(TensorPayload::Spilled { path, len })
    }
}

impl CheckpointSource for SafetensorsSource {
    fn load(&mut self) -> Result<Checkpoint, LoadError> {
        let config_path = self.input_dir.join("config.json");
        if !config_path.exists() {
            return Err(LoadError::MissingConfig(self.input_dir.clone()));
        }
        let config_json = fs::read(&config_path)?;

        let files = self.weight_files()?;
        info!(files = files.len(), dir = %self.input_dir.display(), "reading weight files");

        let mut tensors = Vec::new();
        let mut resident_bytes = 0u64;
        let mut downcast_count = 0usize;

        for file in &files {
            let handle = File::open(file)?;
            // Safety: the input checkpoint is not mutated while mapped.
            let mmap = unsafe { Mmap::map(&handle)? };
            let parsed = SafeTensors::deserialize(&mmap).map_err(|e| LoadError::Parse {
                file: file.clone(),
                message: e.to_string(),
            })?;

            let mut names: Vec<&str> = parsed.names().into_iter().map(String::as_str).collect();
            names.sort_unstable();

            for name in names {
                let view = parsed.tensor(name).map_err(|e| LoadError::Parse {
                    file: file.clone(),
                    message: e.to_string(),
                })?;

                let (dtype, bytes) = match downcast_to_f16(view.dtype(), view.data()) {
                    Some(converted) => {
                        downcast_count += 1;
                        (Dtype::F16, converted)
                    }
                    None => (view.dtype(), view.data().to_vec()),
                };

                let payload =
                    self.place_tensor(&mut resident_bytes, tensors.len(), name, bytes)?;
                tensors.push(TensorEntry {
                    name: name.to_string(),
                    dtype,
                    shape: view.shape().to_vec(),
                    payload,
                });
            }
        }

        if tensors.is_empty() {
            return Err(LoadError::NoWeights(self.input_dir.clone()));
        }

        let checkpoint = Checkpoint {
            tensors,
            config_json,
        };
        info!(
            tensors = checkpoint.len(),
            downcast = downcast_count,
            total_bytes = checkpoint.total_bytes(),
            spilled_bytes = checkpoint.spilled_bytes(),
            "checkpoint loaded in float16"
        );
        Ok(checkpoint)
    }
}

/// Convert one tensor's raw bytes to float16 little-endian bytes.
///
/// Returns `None` for non-float dtypes, which pass through unchanged; the
/// downcast only touches floating-point parameters.
pub fn downcast_to_f16(dtype: Dtype, data: &[u8]) -> Option<Vec<u8>> {
    match dtype {
        Dtype::F16 => Some(data.to_vec()),
        Dtype::BF16 => Some(
            data.chunks_exact(2)
                .flat_map(|b| {
                    let value = bf16::from_bits(u16::from_le_bytes([b[0], b[1]]));
                    f16::from_f32(value.to_f32()).to_le_bytes()
                })
                .collect(),
        ),
        Dtype::F32 => Some(
            data.chunks_exact(4)
                .flat_map(|b| {
                    let value = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    f16::from_f32(value).to_le_bytes()
                })
                .collect(),
        ),
        Dtype::F64 => Some(
            data.chunks_exact(8)
                .flat_map(|b| {
                    let value = f64::from_le_bytes([
                        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                    ]);
                    f16::from_f64(value).to_le_bytes()
                })
                .collect(),
        ),
        _ => None,
    }
}
