//! Compile-time platform configuration.
//!
//! Everything the kernel needs to know about the QEMU `virt` machine lives
//! here as constants; there is no device-tree probing in the bring-up path.

/// Granule size. The translation code is written for 4 KiB only.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: usize = 12;

/// Start of RAM on the `virt` machine.
pub const RAM_BASE: usize = 0x4000_0000;

/// RAM size the kernel is run with (`-m 128M`).
pub const RAM_SIZE: usize = 128 * 1024 * 1024;

/// Physical base of the PL011 debug UART.
pub const UART_PHYS: usize = 0x0900_0000;

/// High-half alias of the UART, live once translation is enabled.
pub const UART_VIRT: usize = HIGH_BASE | UART_PHYS;

/// Virtual address width selected at build time. `va39` narrows the
/// translation regimes to 39 bits; the default is the full 48.
#[cfg(feature = "va39")]
pub const VA_BITS: VaBits = VaBits::Va39;
#[cfg(not(feature = "va39"))]
pub const VA_BITS: VaBits = VaBits::Va48;

/// Base of the high translation regime for the configured width.
pub const HIGH_BASE: usize = VA_BITS.high_base();

/// Size of the stack window (each side of SP) that must be identity-mapped
/// across the translation switch.
pub const STACK_GUARD: usize = 8 * 1024;

/// Virtual address width of a translation regime.
///
/// Both widths use the 4 KiB granule and a level-0 rooted walk; the width
/// only moves T0SZ/T1SZ and the canonical high-half base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaBits {
    Va39,
    Va48,
}

impl VaBits {
    /// Number of translated address bits.
    pub const fn bits(self) -> u32 {
        match self {
            VaBits::Va39 => 39,
            VaBits::Va48 => 48,
        }
    }

    /// TCR_EL1.T0SZ/T1SZ value: 64 minus the translated width.
    pub const fn t_sz(self) -> u64 {
        64 - self.bits() as u64
    }

    /// Canonical base of the high half: every translation-selected top bit
    /// set, zero below. For 48 bits this is 0xFFFF_0000_0000_0000; for
    /// 39 bits, 0xFFFF_FF80_0000_0000.
    pub const fn high_base(self) -> usize {
        !((1 << self.bits()) - 1)
    }
}
