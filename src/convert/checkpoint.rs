//! In-memory model of a loaded checkpoint.
//!
//! Tensors past the device memory ceiling live on disk in the offload
//! scratch dir; everything else stays resident. The checkpoint is the unit
//! of ownership: one live handle per load attempt, dropped before cleanup.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::PathBuf;

use safetensors::Dtype;

/// Where a converted tensor's bytes currently live.
#[derive(Debug)]
pub enum TensorPayload {
    /// Bytes held in host RAM.
    Resident(Vec<u8>),

    /// Bytes spilled to a scratch file under the offload dir.
    Spilled { path: PathBuf, len: u64 },
}

impl TensorPayload {
    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            TensorPayload::Resident(data) => data.len() as u64,
            TensorPayload::Spilled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, TensorPayload::Spilled { .. })
    }

    /// Materialize the payload bytes, reading spilled tensors back from
    /// the scratch file.
    pub fn read(&self) -> io::Result<Cow<'_, [u8]>> {
        match self {
            TensorPayload::Resident(data) => Ok(Cow::Borrowed(data)),
            TensorPayload::Spilled { path, .. } => Ok(Cow::Owned(fs::read(path)?)),
        }
    }
}

/// One named tensor of the converted checkpoint.
#[derive(Debug)]
pub struct TensorEntry {
    /// Parameter name (e.g. "model.layers.0.self_attn.q_proj.weight").
    pub name: String,

    /// Output dtype. F16 for downcast floats, unchanged for the rest.
    pub dtype: Dtype,

    /// Tensor shape.
    pub shape: Vec<usize>,

    /// Converted bytes, little-endian.
    pub payload: TensorPayload,
}

impl TensorEntry {
    pub fn byte_len(&self) -> u64 {
        self.payload.len()
    }
}

/// A loaded, downcast checkpoint plus its passthrough model config.
#[derive(Debug)]
pub struct Checkpoint {
    /// Tensors in save order.
    pub tensors: Vec<TensorEntry>,

    /// Raw bytes of the input config.json, copied through unmodified.
    pub config_json: Vec<u8>,
}

impl Checkpoint {
    /// Total payload bytes across all tensors.
    pub fn total_bytes(&self) -> u64 {
        self.tensors.iter().map(TensorEntry::byte_len).sum()
    }

    /// Bytes currently spilled to the offload dir.
    pub fn spilled_bytes(&self) -> u64 {
        self.tensors
            .iter()
            .filter(|t| t.payload.is_spilled())
            .map(TensorEntry::byte_len)
            .sum()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_payload_lengths() {
        let resident = TensorPayload::Resident(vec![0u8; 16]);
        assert_eq!(resident.len(), 16);
        assert!(!resident.is_spilled());

        let spilled = TensorPayload::Spilled {
            path: PathBuf::from("/tmp/x.bin"),
            len: 32,
        };
        assert_eq!(spilled.len(), 32);
        assert!(spilled.is_spilled());
    }

    #[test]
    fn test_read_spilled_payload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.bin");
        fs::write(&path, [7u8; 8]).unwrap();

        let payload = TensorPayload::Spilled { path, len: 8 };
        let bytes = payload.read().unwrap();
        assert_eq!(bytes.as_ref(), &[7u8; 8]);
    }

    #[test]
    fn test_checkpoint_totals() {
        let ckpt = Checkpoint {
            tensors: vec![
                TensorEntry {
                    name: "a".into(),
                    dtype: Dtype::F16,
                    shape: vec![2],
                    payload: TensorPayload::Resident(vec![0u8; 4]),
                },
                TensorEntry {
                    name: "b".into(),
                    dtype: Dtype::F16,
                    shape: vec![3],
                    payload: TensorPayload::Spilled {
                        path: PathBuf::from("b.bin"),
                        len: 6,
                    },
                },
            ],
            config_json: b"{}".to_vec(),
        };

        assert_eq!(ckpt.total_bytes(), 10);
        assert_eq!(ckpt.spilled_bytes(), 6);
        assert_eq!(ckpt.len(), 2);
    }
}
