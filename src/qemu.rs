//! QEMU-specific utilities for development and testing.
//!
//! This module provides functionality that only works in QEMU, such as
//! semihosting-based exit codes for test automation.

use core::arch::asm;

/// Exit codes for QEMU test runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitCode {
    /// Test or program succeeded.
    Success = 0,
    /// Test or program failed.
    Failed = 1,
}

/// Exit QEMU using ARM semihosting with proper parameter block.
///
/// This only works when running under QEMU with semihosting enabled
/// (-semihosting flag). On real hardware, this will halt the CPU.
///
/// ARM semihosting requires a parameter block for SYS_EXIT:
/// - param\[0\] = 0x20026 (ADP_Stopped_ApplicationExit)
/// - param\[1\] = exit status code
pub fn exit(exit_code: ExitCode) -> ! {
    #[repr(C)]
    struct ExitBlock {
        reason: u64, // 0x20026 = ADP_Stopped_ApplicationExit
        status: u64, // Exit status code
    }

    let block = ExitBlock {
        reason: 0x20026,
        status: exit_code as u64,
    };

    // SAFETY: HLT #0xF000 is the AArch64 semihosting call; w0 = 0x18 is
    // SYS_EXIT and x1 points at a parameter block with the layout the ABI
    // requires. Under QEMU this terminates the machine; on hardware the
    // HLT traps and the CPU stops making progress, which is an acceptable
    // end state for a failed kernel.
    unsafe {
        asm!(
            "mov w0, #0x18",
            "mov x1, {0}",
            "hlt #0xf000",
            in(reg) &block,
            options(noreturn)
        );
    }
}
