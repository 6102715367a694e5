//! AArch64 exception handling.
//!
//! The vector table and its save/restore path live in `exceptions.s`; this
//! module holds the Rust side: syndrome decoding, a register dump for
//! anything unexpected, and BRK step-over so a deliberate breakpoint can be
//! used to prove vector dispatch works after the table moves to its
//! high-half address.
//!
//! VBAR itself is never written here: the MMU policy layer owns every
//! control-register write, and the bring-up sequence installs the table
//! first at its identity address and again at its high alias after the
//! switch.

use core::arch::{asm, global_asm};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::println;

global_asm!(include_str!("../../exceptions.s"));

/// Every AArch64 instruction is 4 bytes; stepping over a BRK is one bump.
const INSTRUCTION_SIZE: u64 = 4;

/// Count of BRK instructions dispatched through the vector table.
static BRK_HITS: AtomicU64 = AtomicU64::new(0);

pub fn brk_hits() -> u64 {
    BRK_HITS.load(Ordering::Acquire)
}

/// Saved register state. Layout must match the save path in `exceptions.s`
/// (general registers in order, then ELR/SPSR, padded to 16 bytes).
#[repr(C)]
pub struct ExceptionContext {
    pub gpr: [u64; 31],
    pub elr_el1: u64,
    pub spsr_el1: u64,
    _pad: u64,
}

/// Which of the 16 vector slots fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Synchronous,
    Irq,
    Fiq,
    SError,
}

impl ExceptionKind {
    fn from_slot(slot: u64) -> Self {
        match slot % 4 {
            0 => ExceptionKind::Synchronous,
            1 => ExceptionKind::Irq,
            2 => ExceptionKind::Fiq,
            _ => ExceptionKind::SError,
        }
    }
}

fn source_name(slot: u64) -> &'static str {
    match slot / 4 {
        0 => "current EL, SP_EL0",
        1 => "current EL, SP_ELx",
        2 => "lower EL, AArch64",
        _ => "lower EL, AArch32",
    }
}

/// ESR_EL1 exception-class field, bits \[31:26\].
fn esr() -> u64 {
    let esr: u64;
    // SAFETY: read-only status register.
    unsafe {
        asm!("mrs {}, esr_el1", out(reg) esr, options(nomem, nostack));
    }
    esr
}

fn far() -> u64 {
    let far: u64;
    // SAFETY: read-only status register.
    unsafe {
        asm!("mrs {}, far_el1", out(reg) far, options(nomem, nostack));
    }
    far
}

fn class_name(ec: u64) -> &'static str {
    match ec {
        0x00 => "Unknown reason",
        0x01 => "Trapped WFI/WFE",
        0x07 => "Trapped FP/SIMD",
        0x0E => "Illegal execution state",
        0x15 => "SVC (AArch64)",
        0x18 => "Trapped MSR/MRS",
        0x20 => "Instruction abort (lower EL)",
        0x21 => "Instruction abort (same EL)",
        0x22 => "PC alignment fault",
        0x24 => "Data abort (lower EL)",
        0x25 => "Data abort (same EL)",
        0x26 => "SP alignment fault",
        0x2F => "SError",
        0x30 | 0x31 => "Breakpoint",
        0x3C => "BRK (AArch64)",
        _ => "Reserved/unknown",
    }
}

/// Rust entry from the vector stubs.
///
/// BRK is the one syndrome handled and resumed: the counter ticks and ELR
/// steps past the instruction. Everything else during bring-up is a bug,
/// and gets the full register dump before the panic.
#[unsafe(no_mangle)]
extern "C" fn exception_handler(ctx: *mut ExceptionContext, slot: u64) {
    // SAFETY: the vector stub passes the context frame it just built on
    // this stack; it stays alive until the matching restore.
    let ctx = unsafe { &mut *ctx };
    let kind = ExceptionKind::from_slot(slot);

    let esr = esr();
    let ec = esr >> 26;

    if kind == ExceptionKind::Synchronous && ec == 0x3C {
        BRK_HITS.fetch_add(1, Ordering::AcqRel);
        ctx.elr_el1 += INSTRUCTION_SIZE;
        return;
    }

    println!(
        "\nEXCEPTION: {:?} ({})\n  ESR  {:#018x}  ({})\n  FAR  {:#018x}\n  ELR  {:#018x}\n  SPSR {:#018x}",
        kind,
        source_name(slot),
        esr,
        class_name(ec),
        far(),
        ctx.elr_el1,
        ctx.spsr_el1,
    );
    for base in (0..30).step_by(2) {
        println!(
            "  x{:<2} {:#018x}  x{:<2} {:#018x}",
            base,
            ctx.gpr[base],
            base + 1,
            ctx.gpr[base + 1],
        );
    }
    println!("  x30 {:#018x}", ctx.gpr[30]);
    panic!("unexpected {:?} exception ({})", kind, class_name(ec));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64::mmu::{layout, policy};
    use crate::config::HIGH_BASE;

    #[test_case]
    fn vectors_resolve_through_the_high_alias() {
        let vbar = policy::current_vbar() as usize;
        assert_eq!(vbar, HIGH_BASE | layout::vector_table());
    }

    #[test_case]
    fn brk_dispatches_and_resumes() {
        let before = brk_hits();
        // SAFETY: the handler steps ELR past the BRK, so execution resumes
        // at the next instruction.
        unsafe {
            asm!("brk #0", options(nomem, nostack));
        }
        assert_eq!(brk_hits(), before + 1);
    }
}
