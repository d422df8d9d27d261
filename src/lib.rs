//! ckpt-reshard: checkpoint re-serialization under a device memory cap.
//!
//! Converts a pretrained causal-LM checkpoint directory into a float16
//! copy split across bounded-size safetensors shards:
//!   guard free VRAM → load under a memory ceiling (spilling to a scratch
//!   dir past the cap) → downcast to FP16 → write shards + tokenizer assets
//!
//! Loading is retried up to three times; device caches are cleared between
//! attempts and unconditionally after saving.

pub mod config;
pub mod convert;
pub mod gpu;
