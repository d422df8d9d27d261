//! Free-VRAM precondition check.
//!
//! Loading a multi-gigabyte checkpoint onto a nearly-full device fails in
//! the middle of placement; the guard rejects the run up front instead.

use tracing::{debug, warn};

use crate::gpu::device::Accelerator;

/// Whether enough accelerator memory is free to attempt a conversion.
///
/// Returns `false` when an accelerator is present and its free memory is
/// below `min_free` bytes. Without an accelerator there is nothing to
/// check and the run proceeds.
pub fn vram_guard(accel: &impl Accelerator, min_free: u64) -> bool {
    match accel.memory() {
        Some(mem) if mem.free < min_free => {
            warn!(
                free_gib = format_args!("{:.1}", gib(mem.free)),
                total_gib = format_args!("{:.1}", gib(mem.total)),
                required_gib = format_args!("{:.1}", gib(min_free)),
                "free VRAM below safety floor"
            );
            false
        }
        Some(mem) => {
            debug!(
                free_gib = format_args!("{:.1}", gib(mem.free)),
                "VRAM check passed"
            );
            true
        }
        None => true,
    }
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1u64 << 30) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_FREE_VRAM;
    use crate::gpu::device::StubAccelerator;

    #[test]
    fn test_guard_rejects_low_vram() {
        let accel = StubAccelerator::with_memory(3 << 30, 6 << 30);
        assert!(!vram_guard(&accel, MIN_FREE_VRAM));
    }

    #[test]
    fn test_guard_passes_at_floor() {
        let accel = StubAccelerator::with_memory(MIN_FREE_VRAM, 8 << 30);
        assert!(vram_guard(&accel, MIN_FREE_VRAM));
    }

    #[test]
    fn test_guard_passes_without_accelerator() {
        let accel = StubAccelerator::absent();
        assert!(vram_guard(&accel, MIN_FREE_VRAM));
    }
}
