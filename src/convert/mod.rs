//! Checkpoint conversion pipeline.
//!
//! - [`checkpoint`]: in-memory checkpoint model (resident vs spilled tensors)
//! - [`loader`]: safetensors input reading and float16 downcast
//! - [`shard`]: bounded-size shard planning
//! - [`saver`]: sharded safetensors output + index
//! - [`tokenizer`]: tokenizer asset discovery and copy
//! - [`driver`]: guard → retry-load → save orchestration

pub mod checkpoint;
pub mod driver;
pub mod loader;
pub mod saver;
pub mod shard;
pub mod tokenizer;
