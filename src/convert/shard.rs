//! Shard planning.
//!
//! Tensors are packed greedily, in save order, into groups whose payload
//! total stays under the shard limit. A tensor larger than the limit gets
//! a shard of its own rather than failing the save.

use crate::convert::checkpoint::TensorEntry;

/// Group tensors (by index into `tensors`) into bounded-size shards.
pub fn plan_shards(tensors: &[TensorEntry], limit: u64) -> Vec<Vec<usize>> {
    let mut shards: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_bytes = 0u64;

    for (i, tensor) in tensors.iter().enumerate() {
        let len = tensor.byte_len();
        if !current.is_empty() && current_bytes + len > limit {
            shards.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(i);
        current_bytes += len;
    }

    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

/// File name for shard `index` (1-based) of `total`.
///
/// A single-shard checkpoint keeps the plain model.safetensors name and
/// needs no index file.
pub fn shard_file_name(index: usize, total: usize) -> String {
    if total == 1 {
        "model.safetensors".to_string()
    } else {
        format!("model-{index:05}-of-{total:05}.safetensors")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::checkpoint::TensorPayload;
    use safetensors::Dtype;
    use std::path::PathBuf;

    fn entry(name: &str, len: u64) -> TensorEntry {
        // Spilled payloads carry a length without allocating.
        TensorEntry {
            name: name.to_string(),
            dtype: Dtype::F16,
            shape: vec![len as usize / 2],
            payload: TensorPayload::Spilled {
                path: PathBuf::from(format!("{name}.bin")),
                len,
            },
        }
    }

    #[test]
    fn test_plan_respects_limit() {
        let tensors = vec![entry("a", 40), entry("b", 40), entry("c", 40)];
        let plan = plan_shards(&tensors, 100);

        assert_eq!(plan, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_oversized_tensor_gets_own_shard() {
        let tensors = vec![entry("a", 10), entry("big", 500), entry("c", 10)];
        let plan = plan_shards(&tensors, 100);

        assert_eq!(plan, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_everything_fits_in_one_shard() {
        let tensors = vec![entry("a", 10), entry("b", 20)];
        let plan = plan_shards(&tensors, 100);

        assert_eq!(plan, vec![vec![0, 1]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(plan_shards(&[], 100).is_empty());
    }

    #[test]
    fn test_plan_covers_every_tensor_once() {
        let tensors: Vec<TensorEntry> =
            (0..37).map(|i| entry(&format!("t{i}"), 7 + i % 13)).collect();
        let plan = plan_shards(&tensors, 25);

        let mut seen: Vec<usize> = plan.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_shard_file_names() {
        assert_eq!(shard_file_name(1, 1), "model.safetensors");
        assert_eq!(shard_file_name(1, 3), "model-00001-of-00003.safetensors");
        assert_eq!(shard_file_name(3, 3), "model-00003-of-00003.safetensors");
    }
}
