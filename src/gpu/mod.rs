//! Accelerator runtime access.
//!
//! - [`device`]: accelerator abstraction, CUDA memory queries, test stubs
//! - [`guard`]: free-VRAM precondition check

pub mod device;
pub mod guard;
