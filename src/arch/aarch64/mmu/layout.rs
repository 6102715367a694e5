//! Kernel image layout, as reported by the linker script.
//!
//! All addresses returned here are physical: the image is linked at its
//! load address and only ever aliased (never relinked) into the high half.

macro_rules! linker_symbol {
    ($name:ident) => {{
        unsafe extern "C" {
            static $name: u8;
        }
        // SAFETY: only the address is taken; the symbol has no backing
        // object and is never dereferenced through this path.
        unsafe { core::ptr::addr_of!($name) as usize }
    }};
}

/// `[start, end)` of the kernel's executable code, including the boot
/// stub, vector table and trampoline.
pub fn text() -> (usize, usize) {
    (linker_symbol!(__text_start), linker_symbol!(__text_end))
}

pub fn rodata() -> (usize, usize) {
    (linker_symbol!(__rodata_start), linker_symbol!(__rodata_end))
}

/// `.data` and `.bss` as one writable span.
pub fn data_bss() -> (usize, usize) {
    (linker_symbol!(__data_start), linker_symbol!(__bss_end))
}

/// The 2 KiB-aligned exception vector table.
pub fn vector_table() -> usize {
    linker_symbol!(__vector_table)
}

/// The trampoline's private page.
pub fn trampoline() -> (usize, usize) {
    (
        linker_symbol!(__trampoline_start),
        linker_symbol!(__trampoline_end),
    )
}

pub fn boot_stack() -> (usize, usize) {
    (
        linker_symbol!(__boot_stack_bottom),
        linker_symbol!(__boot_stack_top),
    )
}

/// First frame past everything the image occupies.
pub fn kernel_end() -> usize {
    linker_symbol!(__kernel_end)
}
