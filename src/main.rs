#![no_std]
#![no_main]

use core::panic::PanicInfo;

use icarus::config;
use icarus::mm::{paging, pmm};
use icarus::println;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("{}", info);
    loop {
        // SAFETY: WFE only pauses the core.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack)) };
    }
}

/// Rust entry point, called from boot.s with the MMU off and everything
/// masked. Sets up the pre-translation environment, then hands the CPU to
/// the bring-up orchestrator; `kernel_main` resumes in the high half.
#[unsafe(no_mangle)]
pub extern "C" fn _start_rust() -> ! {
    icarus::init();
    println!("icarus: booting, switching to virtual addressing");
    icarus::bring_up_mmu(config::VA_BITS, kernel_main)
}

/// Post-switch kernel. Runs at `HIGH_BASE | load address` with the low
/// regime retired.
fn kernel_main() -> ! {
    println!("icarus: kernel up at {:#018x}", kernel_main as usize);

    let _ = paging::with_kernel_tables(|tables| tables.dump());
    let frames = pmm::stats();
    println!(
        "icarus: {} frames total, {} free",
        frames.total, frames.free
    );

    loop {
        // SAFETY: WFE only pauses the core.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack)) };
    }
}
