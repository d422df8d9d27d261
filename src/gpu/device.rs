//! Accelerator abstraction.
//!
//! The conversion only needs two things from the accelerator runtime: a
//! free/total memory snapshot and a cache-clear operation. When compiled
//! without the `cuda` feature, no accelerator is ever reported.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Free/total device memory at query time, in bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub free: u64,
    pub total: u64,
}

/// The accelerator surface the conversion consumes.
pub trait Accelerator {
    /// Memory snapshot of the primary device, or `None` when no
    /// accelerator is present.
    fn memory(&self) -> Option<MemoryInfo>;

    /// Release cached device allocations. No-op without an accelerator.
    fn clear_cache(&self);
}

impl<T: Accelerator + ?Sized> Accelerator for &T {
    fn memory(&self) -> Option<MemoryInfo> {
        (**self).memory()
    }

    fn clear_cache(&self) {
        (**self).clear_cache()
    }
}

/// The real accelerator runtime.
///
/// With the `cuda` feature enabled, queries the CUDA runtime for device
/// memory. Without it, reports no accelerator (CPU-only mode).
pub struct GpuRuntime;

impl GpuRuntime {
    pub fn detect() -> Self {
        #[cfg(not(feature = "cuda"))]
        info!("CUDA not enabled, running in CPU-only mode");

        Self
    }
}

impl Accelerator for GpuRuntime {
    fn memory(&self) -> Option<MemoryInfo> {
        #[cfg(feature = "cuda")]
        {
            cuda_memory_info()
        }

        #[cfg(not(feature = "cuda"))]
        {
            None
        }
    }

    fn clear_cache(&self) {
        #[cfg(feature = "cuda")]
        cuda_clear_cache();

        #[cfg(not(feature = "cuda"))]
        debug!("clear_cache: no accelerator, nothing to release");
    }
}

#[cfg(feature = "cuda")]
fn cuda_memory_info() -> Option<MemoryInfo> {
    // Real implementation would query the primary device via cudarc.
    // Compile-time gated stub, filled in when cudarc is available.
    todo!("query free/total VRAM via cudarc")
}

#[cfg(feature = "cuda")]
fn cuda_clear_cache() {
    todo!("release cached device allocations via cudarc")
}

/// Accelerator stub with a fixed memory snapshot and an observable
/// cache-clear counter. Used by tests in place of real hardware.
#[derive(Debug, Default)]
pub struct StubAccelerator {
    memory: Option<MemoryInfo>,
    cache_clears: AtomicU32,
}

impl StubAccelerator {
    /// Stub with the given free/total VRAM, in bytes.
    pub fn with_memory(free: u64, total: u64) -> Self {
        Self {
            memory: Some(MemoryInfo { free, total }),
            cache_clears: AtomicU32::new(0),
        }
    }

    /// Stub reporting no accelerator at all.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Number of times `clear_cache` has been called.
    pub fn cache_clears(&self) -> u32 {
        self.cache_clears.load(Ordering::Relaxed)
    }
}

impl Accelerator for StubAccelerator {
    fn memory(&self) -> Option<MemoryInfo> {
        self.memory
    }

    fn clear_cache(&self) {
        self.cache_clears.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_reports_configured_memory() {
        let accel = StubAccelerator::with_memory(6 << 30, 8 << 30);
        let mem = accel.memory().unwrap();
        assert_eq!(mem.free, 6 << 30);
        assert_eq!(mem.total, 8 << 30);
    }

    #[test]
    fn test_stub_counts_cache_clears() {
        let accel = StubAccelerator::absent();
        assert!(accel.memory().is_none());

        accel.clear_cache();
        accel.clear_cache();
        assert_eq!(accel.cache_clears(), 2);
    }
}
