//! Memory management: physical frames, descriptor encoding, and the
//! translation-table builder.
//!
//! The modules here are deliberately free of control-register access; every
//! MAIR/TCR/TTBR/SCTLR write and every TLB/cache maintenance sequence is
//! issued by the policy layer in `arch::aarch64::mmu`, which this code calls
//! at the points the maintenance contract requires.

pub mod descriptor;
pub mod paging;
pub mod pmm;

use core::sync::atomic::{AtomicUsize, Ordering};

/// OR-mask applied when converting a physical address to a dereferenceable
/// pointer. Zero until the translation switch completes (physical and
/// virtual coincide under the identity mapping); the continuation stores
/// the high-half base here once the low regime is about to go away.
static PHYS_ACCESS_OFFSET: AtomicUsize = AtomicUsize::new(0);

/// Switch physical-memory access over to the high-half linear alias.
///
/// Called exactly once, by the continuation, after the program counter has
/// moved into the high regime and before TTBR0 walks are disabled.
pub fn activate_high_half(high_base: usize) {
    PHYS_ACCESS_OFFSET.store(high_base, Ordering::Release);
}

/// True once `activate_high_half` has run.
pub fn high_half_active() -> bool {
    PHYS_ACCESS_OFFSET.load(Ordering::Acquire) != 0
}

/// Virtual address through which the given physical address is currently
/// reachable: the identity alias before the switch, `HIGH_BASE | pa` after.
pub fn phys_to_virt(pa: usize) -> usize {
    PHYS_ACCESS_OFFSET.load(Ordering::Acquire) | pa
}
