//! MMU bring-up orchestrator.
//!
//! Drives the one-shot sequence that takes the CPU from untranslated
//! physical execution to the kernel's permanent high-half address space:
//!
//! ```text
//!   INIT -> TABLES_READY -> MAPPINGS_READY -> VERIFIED -> ARMED
//!                                                           |
//!                              FATAL <- (any miss)          v
//!                                              TRANSLATING -> CONTINUED
//! ```
//!
//! Every resource the CPU touches across the enable instant (every
//! instruction byte, the stack, the UART, the vector table, the tables
//! themselves) must already be mapped in the low regime at its physical
//! address and in the high regime at `high_base | phys` before SCTLR.M is
//! set. The VERIFIED step re-walks the critical addresses and refuses to
//! arm if anything is missing or mis-permissioned: a hole here does not get
//! silently repaired, it gets a diagnostic and a halt, because a repair at
//! this stage is a bug in the mapping phase hiding itself.
//!
//! All state is threaded through [`BringUpContext`]; the only global this
//! module populates is the builder's long-lived table home, installed just
//! before the switch.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use super::{layout, policy, trampoline};
use crate::config::{PAGE_SIZE, RAM_BASE, RAM_SIZE, STACK_GUARD, UART_PHYS, VaBits};
use crate::drivers::uart;
use crate::mm::descriptor::{AccessPermission, AttrIndex, ExecuteNever, PageAttributes, TcrProfile};
use crate::mm;
use crate::mm::paging::{self, KernelTables, MapError, PageMapping, Regime};
use crate::println;

/// Coarse progress tag, reported on the fatal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Init = 0x0,
    TablesReady = 0x1,
    MappingsReady = 0x2,
    Verified = 0x3,
    Armed = 0x4,
    Translating = 0x5,
    Continued = 0x6,
}

/// Bring-up state threaded from the orchestrator into the continuation.
pub struct BringUpContext {
    stage: Stage,
    va_bits: VaBits,
    high_base: usize,
    vbar_phys: usize,
}

/// SCTLR_EL1 as sampled immediately before the enable; the post-enable
/// checks compare against this to prove no previously-set (including
/// reserved-as-one) bit was lost.
static SCTLR_AT_ENABLE: AtomicU64 = AtomicU64::new(0);

pub fn sctlr_before_enable() -> u64 {
    SCTLR_AT_ENABLE.load(Ordering::Acquire)
}

/// Halt with a diagnostic naming the last stage that completed.
///
/// A short raw byte signature goes out first so the failure point is
/// identifiable even if formatted printing is itself broken.
fn fatal(stage: Stage, detail: fmt::Arguments<'_>) -> ! {
    for byte in *b"\r\nVM!" {
        uart::put_byte(byte);
    }
    uart::put_byte(b'0' + stage as u8);
    uart::put_byte(b'\r');
    uart::put_byte(b'\n');
    panic!("vm: bring-up failed after {stage:?}: {detail}");
}

fn map_failure(stage: Stage, what: &str, err: MapError) -> ! {
    fatal(stage, format_args!("mapping `{what}`: {err:?}"));
}

// ============================================================================
// Critical-mapping verification
// ============================================================================

/// What a critical address must look like when walked.
#[derive(Debug, Clone, Copy)]
pub enum Require {
    /// Kernel-executable text: normal WB, read-only at EL1, PXN clear.
    KernelText,
    /// Kernel-writable normal memory.
    Writable,
    /// MMIO: Device-nGnRE, writable, execute-never at every level.
    Device,
}

impl Require {
    fn check(self, mapping: &PageMapping) -> Result<(), &'static str> {
        let attrs = &mapping.attrs;
        if !attrs.access_flag {
            return Err("access flag clear");
        }
        match self {
            Require::KernelText => {
                if attrs.attr_index != AttrIndex::NormalWb {
                    return Err("text not normal write-back");
                }
                if attrs.access != AccessPermission::KernelRo {
                    return Err("text not kernel read-only");
                }
                if matches!(
                    attrs.execute_never,
                    ExecuteNever::PrivilegedOnly | ExecuteNever::Both
                ) {
                    return Err("text not executable at EL1");
                }
            }
            Require::Writable => {
                if !attrs.access.kernel_writable() {
                    return Err("not writable at EL1");
                }
            }
            Require::Device => {
                if attrs.attr_index != AttrIndex::DeviceNGnRE {
                    return Err("MMIO not Device-nGnRE");
                }
                if !attrs.access.kernel_writable() {
                    return Err("MMIO not writable at EL1");
                }
                if attrs.execute_never != ExecuteNever::Both {
                    return Err("MMIO executable");
                }
            }
        }
        Ok(())
    }
}

/// One address the switch cannot survive without.
#[derive(Debug, Clone, Copy)]
pub struct Critical {
    pub name: &'static str,
    pub regime: Regime,
    pub va: usize,
    pub require: Require,
}

/// Why verification refused to arm.
#[derive(Debug, Clone, Copy)]
pub enum VerifyError {
    Missing {
        name: &'static str,
        va: usize,
    },
    BadMapping {
        name: &'static str,
        va: usize,
        problem: &'static str,
    },
}

/// Walk every critical address and confirm a valid, correctly-permissioned
/// descriptor. Never repairs anything.
pub fn verify_critical_mappings(
    tables: &KernelTables,
    criticals: &[Critical],
) -> Result<(), VerifyError> {
    for critical in criticals {
        let Some(mapping) = tables.lookup(critical.regime, critical.va) else {
            return Err(VerifyError::Missing {
                name: critical.name,
                va: critical.va,
            });
        };
        if let Err(problem) = critical.require.check(&mapping) {
            return Err(VerifyError::BadMapping {
                name: critical.name,
                va: critical.va,
                problem,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Mapping phase
// ============================================================================

/// Map one physical range into both regimes: identity in the low half,
/// `high_base | pa` in the high half.
fn map_dual(
    tables: &mut KernelTables,
    high_base: usize,
    pa_start: usize,
    pa_end: usize,
    attrs: PageAttributes,
    name: &'static str,
    name_high: &'static str,
) -> Result<(), MapError> {
    tables.map_range(Regime::Low, pa_start, pa_end, pa_start, attrs, name)?;
    tables.map_range(
        Regime::High,
        high_base | pa_start,
        high_base | pa_end,
        pa_start,
        attrs,
        name_high,
    )?;
    Ok(())
}

/// Install every mapping the switch depends on. Order matters only where
/// ranges overlap: the RAM-wide spans go in first and the permission
/// refinements (text, rodata) overwrite their slice of it.
fn install_mappings(
    tables: &mut KernelTables,
    high_base: usize,
    stack_pointer: usize,
) -> Result<(), (&'static str, MapError)> {
    let tag = |name: &'static str| move |err| (name, err);

    // Whole of RAM: identity for the dual window, linear alias for the
    // kernel's permanent access to physical memory (table pages included).
    map_dual(
        tables,
        high_base,
        RAM_BASE,
        RAM_BASE + RAM_SIZE,
        PageAttributes::KERNEL_DATA,
        "ram (identity)",
        "ram (linear)",
    )
    .map_err(tag("ram"))?;

    let (text_start, text_end) = layout::text();
    map_dual(
        tables,
        high_base,
        text_start,
        text_end,
        PageAttributes::KERNEL_TEXT,
        "kernel text",
        "kernel text (high)",
    )
    .map_err(tag("kernel text"))?;

    let (rodata_start, rodata_end) = layout::rodata();
    map_dual(
        tables,
        high_base,
        rodata_start,
        rodata_end,
        PageAttributes::KERNEL_RODATA,
        "kernel rodata",
        "kernel rodata (high)",
    )
    .map_err(tag("kernel rodata"))?;

    let (data_start, bss_end) = layout::data_bss();
    map_dual(
        tables,
        high_base,
        data_start,
        bss_end,
        PageAttributes::KERNEL_DATA,
        "kernel data+bss",
        "kernel data+bss (high)",
    )
    .map_err(tag("kernel data+bss"))?;

    map_dual(
        tables,
        high_base,
        UART_PHYS,
        UART_PHYS + PAGE_SIZE,
        PageAttributes::DEVICE,
        "uart",
        "uart (high)",
    )
    .map_err(tag("uart"))?;

    let vbar = layout::vector_table();
    map_dual(
        tables,
        high_base,
        vbar,
        vbar + 0x800,
        PageAttributes::KERNEL_TEXT,
        "vector table",
        "vector table (high)",
    )
    .map_err(tag("vector table"))?;

    let (tramp_start, tramp_end) = layout::trampoline();
    map_dual(
        tables,
        high_base,
        tramp_start,
        tramp_end,
        PageAttributes::KERNEL_TEXT,
        "trampoline",
        "trampoline (high)",
    )
    .map_err(tag("trampoline"))?;

    // The live stack, with the guard window either side of SP.
    let (stack_bottom, stack_top) = layout::boot_stack();
    map_dual(
        tables,
        high_base,
        stack_bottom,
        stack_top,
        PageAttributes::KERNEL_DATA,
        "boot stack",
        "boot stack (high)",
    )
    .map_err(tag("boot stack"))?;
    let window_lo = stack_pointer.saturating_sub(STACK_GUARD).max(RAM_BASE);
    let window_hi = (stack_pointer + STACK_GUARD).min(RAM_BASE + RAM_SIZE);
    map_dual(
        tables,
        high_base,
        window_lo,
        window_hi,
        PageAttributes::KERNEL_DATA,
        "stack window",
        "stack window (high)",
    )
    .map_err(tag("stack window"))?;

    // Root tables, so post-enable code keeps reaching the hierarchy through
    // the addresses it has been using all along.
    for regime in [Regime::Low, Regime::High] {
        let root = tables.root_pa(regime);
        map_dual(
            tables,
            high_base,
            root,
            root + PAGE_SIZE,
            PageAttributes::KERNEL_DATA,
            "translation root",
            "translation root (high)",
        )
        .map_err(tag("translation root"))?;
    }

    Ok(())
}

// ============================================================================
// Orchestration
// ============================================================================

fn current_pc() -> usize {
    let pc: usize;
    // SAFETY: ADR of the next location; no memory or flags touched.
    unsafe {
        core::arch::asm!("adr {}, 2f", "2:", out(reg) pc, options(nomem, nostack));
    }
    pc
}

fn current_sp() -> usize {
    let sp: usize;
    // SAFETY: reads the stack pointer register only.
    unsafe {
        core::arch::asm!("mov {}, sp", out(reg) sp, options(nomem, nostack));
    }
    sp
}

/// Build both regimes, verify them, and switch the CPU into the high half.
///
/// On success control re-emerges at `after`, executing at its high-virtual
/// alias with the low regime already retired. On any failure the CPU halts
/// with a diagnostic; there is no error return, because nothing can be
/// rolled back once the sequence is armed.
pub fn bring_up_mmu(va_bits: VaBits, after: fn() -> !) -> ! {
    // The whole window runs with Debug, SError, IRQ and FIQ masked: an
    // exception taken mid-switch would be fetched under an unpredictable
    // translation context.
    policy::mask_exceptions();

    let high_base = va_bits.high_base();
    let mut ctx = BringUpContext {
        stage: Stage::Init,
        va_bits,
        high_base,
        vbar_phys: layout::vector_table(),
    };

    // INIT -> TABLES_READY
    let mut tables = match KernelTables::new(va_bits) {
        Ok(tables) => tables,
        Err(err) => fatal(ctx.stage, format_args!("allocating roots: {err:?}")),
    };
    ctx.stage = Stage::TablesReady;

    // TABLES_READY -> MAPPINGS_READY
    let stack_pointer = current_sp();
    if let Err((what, err)) = install_mappings(&mut tables, high_base, stack_pointer) {
        map_failure(ctx.stage, what, err);
    }
    ctx.stage = Stage::MappingsReady;

    // MAPPINGS_READY -> VERIFIED
    let landing = trampoline::landing_entry();
    let (tramp_start, _) = layout::trampoline();
    let vbar = ctx.vbar_phys;
    let pc = current_pc();
    let criticals = [
        Critical {
            name: "continuation landing",
            regime: Regime::High,
            va: high_base | landing,
            require: Require::KernelText,
        },
        Critical {
            name: "trampoline (identity)",
            regime: Regime::Low,
            va: tramp_start,
            require: Require::KernelText,
        },
        Critical {
            name: "trampoline (high)",
            regime: Regime::High,
            va: high_base | tramp_start,
            require: Require::KernelText,
        },
        Critical {
            name: "uart (identity)",
            regime: Regime::Low,
            va: UART_PHYS,
            require: Require::Device,
        },
        Critical {
            name: "uart (high)",
            regime: Regime::High,
            va: high_base | UART_PHYS,
            require: Require::Device,
        },
        Critical {
            name: "vector table (identity)",
            regime: Regime::Low,
            va: vbar,
            require: Require::KernelText,
        },
        Critical {
            name: "vector table (high)",
            regime: Regime::High,
            va: high_base | vbar,
            require: Require::KernelText,
        },
        Critical {
            name: "current pc (identity)",
            regime: Regime::Low,
            va: pc,
            require: Require::KernelText,
        },
        Critical {
            name: "current pc (high)",
            regime: Regime::High,
            va: high_base | pc,
            require: Require::KernelText,
        },
        Critical {
            name: "post-switch entry",
            regime: Regime::High,
            va: high_base | (after as usize),
            require: Require::KernelText,
        },
        Critical {
            name: "current sp (identity)",
            regime: Regime::Low,
            va: stack_pointer,
            require: Require::Writable,
        },
        Critical {
            name: "current sp (high)",
            regime: Regime::High,
            va: high_base | stack_pointer,
            require: Require::Writable,
        },
    ];
    if let Err(err) = verify_critical_mappings(&tables, &criticals) {
        fatal(ctx.stage, format_args!("{err:?}"));
    }
    ctx.stage = Stage::Verified;

    // VERIFIED -> ARMED: program the control registers, flush stale
    // translations, and point VBAR at the identity alias of the vectors,
    // the value in force the instant translation turns on.
    let root_low = tables.root_pa(Regime::Low);
    let root_high = tables.root_pa(Regime::High);
    paging::install_kernel_tables(tables);

    policy::configure_mair();
    policy::configure_tcr(TcrProfile::BootstrapDual, va_bits);
    policy::set_ttbr_bases(root_low, root_high);
    policy::tlbi_full();
    policy::icache_invalidate_all();
    policy::set_vbar(vbar);
    SCTLR_AT_ENABLE.store(policy::sctlr(), Ordering::Release);
    policy::barrier_pre_enable();
    ctx.stage = Stage::Armed;

    // ARMED -> TRANSLATING: from the branch below until the landing stub,
    // every fetched byte must be identity-mapped.
    ctx.stage = Stage::Translating;
    // SAFETY: the ARMED checklist above is exactly the contract
    // `enable_translation` documents; ctx, the entry point and the landing
    // stub are all dual-mapped and were just verified.
    unsafe {
        policy::enable_translation(
            core::ptr::addr_of_mut!(ctx) as usize,
            high_base | trampoline::landing_entry(),
            after as usize,
            high_base,
        );
    }
}

/// First Rust code in the high half. Entered from the landing stub with SP
/// and both pointers already rebased.
#[unsafe(no_mangle)]
pub extern "C" fn vm_continuation(ctx: *mut BringUpContext, entry: usize) -> ! {
    policy::barrier_post_enable();

    // SAFETY: the orchestrator passed `&mut ctx` of a frame that stays
    // alive forever (bring_up_mmu never returns), rebased to the high alias
    // by the landing stub.
    let ctx = unsafe { &mut *ctx };

    if !policy::translation_enabled() {
        fatal(
            ctx.stage,
            format_args!("SCTLR.M reads 0 after the enable sequence"),
        );
    }

    // Vectors move to the high alias before anything can fault.
    policy::set_vbar(ctx.high_base | ctx.vbar_phys);

    // Physical memory (table pages included) is reachable through the
    // linear alias from here on; the identity window is about to close.
    mm::activate_high_half(ctx.high_base);

    // Retire the low regime and evict every bootstrap translation.
    policy::configure_tcr(TcrProfile::KernelOnly, ctx.va_bits);
    policy::tlbi_full();

    // The UART driver follows us into the high half.
    uart::relocate(ctx.high_base | UART_PHYS);

    ctx.stage = Stage::Continued;
    println!(
        "vm: high half live ({:?}, base {:#018x})",
        ctx.va_bits, ctx.high_base
    );

    // SAFETY: `entry` is the high alias of the `fn() -> !` the kernel
    // passed to `bring_up_mmu`; the verification step proved it is mapped
    // executable in the high regime.
    let entry: fn() -> ! = unsafe { core::mem::transmute(entry) };
    entry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{UART_VIRT, VA_BITS};

    // The fatal path itself diverges, so the refusal logic is exercised
    // directly against a deliberately incomplete hierarchy.
    #[test_case]
    fn verification_names_a_missing_critical_mapping() {
        let mut tables = KernelTables::new(VA_BITS).expect("table roots");
        let (tramp_start, tramp_end) = layout::trampoline();
        // Identity half only; the high alias is deliberately omitted.
        tables
            .map_range(
                Regime::Low,
                tramp_start,
                tramp_end,
                tramp_start,
                PageAttributes::KERNEL_TEXT,
                "test trampoline",
            )
            .unwrap();

        let criticals = [
            Critical {
                name: "trampoline (identity)",
                regime: Regime::Low,
                va: tramp_start,
                require: Require::KernelText,
            },
            Critical {
                name: "trampoline (high)",
                regime: Regime::High,
                va: VA_BITS.high_base() | tramp_start,
                require: Require::KernelText,
            },
        ];
        match verify_critical_mappings(&tables, &criticals) {
            Err(VerifyError::Missing { name, va }) => {
                assert_eq!(name, "trampoline (high)");
                assert_eq!(va, VA_BITS.high_base() | tramp_start);
            }
            other => panic!("expected missing trampoline alias, got {:?}", other),
        }
    }

    #[test_case]
    fn verification_rejects_wrong_permissions() {
        let mut tables = KernelTables::new(VA_BITS).expect("table roots");
        let (tramp_start, tramp_end) = layout::trampoline();
        // Mapped, but writable data instead of executable text.
        tables
            .map_range(
                Regime::Low,
                tramp_start,
                tramp_end,
                tramp_start,
                PageAttributes::KERNEL_DATA,
                "test trampoline",
            )
            .unwrap();

        let criticals = [Critical {
            name: "trampoline (identity)",
            regime: Regime::Low,
            va: tramp_start,
            require: Require::KernelText,
        }];
        assert!(matches!(
            verify_critical_mappings(&tables, &criticals),
            Err(VerifyError::BadMapping { name: "trampoline (identity)", .. })
        ));
    }

    #[test_case]
    fn live_kernel_passed_its_own_verification() {
        // The machine these tests run on got here through the sequence
        // above; its installed tables must still satisfy the contract.
        let checked = paging::with_kernel_tables(|tables| {
            let uart = tables.lookup(Regime::High, UART_VIRT).expect("uart mapping");
            assert_eq!(uart.pa, UART_PHYS);
            assert_eq!(uart.attrs.attr_index, AttrIndex::DeviceNGnRE);
            assert!(tables.tables_aligned());
        });
        assert!(checked.is_some(), "kernel tables not installed");
    }

    #[test_case]
    fn sctlr_kept_every_preenable_bit() {
        let before = sctlr_before_enable();
        assert_ne!(before, 0, "no pre-enable snapshot recorded");
        let now = policy::sctlr();
        assert_ne!(now & policy::SCTLR_M, 0, "translation not enabled");
        assert_eq!(
            before & !now,
            0,
            "bits set before the enable (including reserved-as-one) were lost"
        );
    }
}
