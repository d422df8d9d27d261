//! Sharded safetensors output.
//!
//! Writes each planned shard with safe serialization (no executable
//! payloads), then the shard index and the passthrough config.json.
//! Spilled tensors are read back from the offload dir one shard at a
//! time, so peak memory stays near the shard limit.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use safetensors::tensor::TensorView;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::convert::checkpoint::Checkpoint;
use crate::convert::shard::{plan_shards, shard_file_name};

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("safetensors serialization failed for {file}: {message}")]
    Serialize { file: String, message: String },

    #[error("shard index serialization failed: {0}")]
    Index(#[from] serde_json::Error),
}

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// Number of weight shards written.
    pub shards: usize,

    /// Total tensor payload bytes written.
    pub total_bytes: u64,
}

#[derive(Serialize)]
struct WeightIndex<'a> {
    metadata: IndexMetadata,
    weight_map: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct IndexMetadata {
    total_size: u64,
}

/// Write the checkpoint to `out_dir` as float16 safetensors shards no
/// larger than `shard_limit` payload bytes, plus index and config.
pub fn save_checkpoint(
    checkpoint: &Checkpoint,
    out_dir: &Path,
    shard_limit: u64,
) -> Result<SaveReport, SaveError> {
    fs::create_dir_all(out_dir)?;

    let plan = plan_shards(&checkpoint.tensors, shard_limit);
    let shard_count = plan.len();
    let mut weight_map: BTreeMap<String, String> = BTreeMap::new();

    for (shard_idx, group) in plan.iter().enumerate() {
        let file_name = shard_file_name(shard_idx + 1, shard_count);
        let path = out_dir.join(&file_name);

        // Materialize this shard's payloads; spilled tensors come back
        // from the scratch dir here.
        let mut buffers: Vec<(usize, Cow<'_, [u8]>)> = Vec::with_capacity(group.len());
        for &i in group {
            buffers.push((i, checkpoint.tensors[i].payload.read()?));
        }

        let views: Vec<(&str, TensorView<'_>)> = buffers
            .iter()
            .map(|(i, bytes)| {
                let tensor = &checkpoint.tensors[*i];
                let view = TensorView::new(tensor.dtype, tensor.shape.clone(), bytes)
                    .map_err(|e| SaveError::Serialize {
                        file: file_name.clone(),
                        message: e.to_string(),
                    })?;
                Ok((tensor.name.as_str(), view))
            })
            .collect::<Result<_, SaveError>>()?;

        safetensors::serialize_to_file(views, &None, &path).map_err(|e| {
            SaveError::Serialize {
                file: file_name.clone(),
                message: e.to_string(),
            }
        })?;

        for &i in group {
            weight_map.insert(checkpoint.tensors[i].name.clone(), file_name.clone());
        }
        debug!(
            shard = shard_idx + 1,
            of = shard_count,
            tensors = group.len(),
            path = %path.display(),
            "wrote weight shard"
        );
    }

    if shard_count > 1 {
        let index = WeightIndex {
            metadata: IndexMetadata {
                total_size: checkpoint.total_bytes(),
            },
            weight_map: &weight_map,
        };
        let index_path = out_dir.join("model.safetensors.index.json");
        fs::write(&index_path, serde_json::to_string_pretty(&index)?)?;
        debug!(path = %index_path.display(), "wrote shard index");
    }

    fs::write(out_dir.join("config.json"), &checkpoint.config_json)?;

    let report = SaveReport {
        shards: shard_count,
        total_bytes: checkpoint.total_bytes(),
    };
    info!(
        shards = report.shards,
        total_bytes = report.total_bytes,
        dir = %out_dir.display(),
        "checkpoint saved"
    );
    Ok(report)
}
