//! PL011 UART driver for serial console I/O.
//!
//! Polling-based transmit-only driver for the `virt` machine's PL011. The
//! one bring-up-specific wrinkle: the register base is *relocatable*. The
//! driver starts on the physical MMIO address (reachable before and during
//! the translation switch through the identity mapping) and is moved to the
//! high-half alias by the continuation, after which the physical address is
//! no longer mapped at all.

use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;

use crate::config::UART_PHYS;

/// PL011 UART register bit definitions.
///
/// Reference: [ARM PL011 TRM](https://developer.arm.com/documentation/ddi0183/latest/)
mod pl011_flags {
    // Flag Register (FR) bits - Section 3.3.6
    pub const FR_TXFF: u32 = 1 << 5; // Transmit FIFO full

    // Line Control Register (LCRH) bits - Section 3.3.7
    pub const LCRH_FEN: u32 = 1 << 4; // FIFO enable
    pub const LCRH_WLEN_8BIT: u32 = 0b11 << 5; // 8-bit word length

    // Control Register (CR) bits - Section 3.3.8
    pub const CR_UARTEN: u32 = 1 << 0; // UART enable
    pub const CR_TXE: u32 = 1 << 8; // Transmit enable

    // Interrupt Clear Register (ICR) - Section 3.3.13
    pub const ICR_ALL: u32 = 0x7FF; // Clear all interrupts
}

lazy_static! {
    pub static ref WRITER: Mutex<UartWriter> = Mutex::new(UartWriter::new(UART_PHYS));
}

/// PL011 register block.
#[repr(C)]
struct Pl011Registers {
    dr: Volatile<u32>, // 0x00 - Data Register
    _rsv0: [u32; 5],
    fr: Volatile<u32>, // 0x18 - Flag Register
    _rsv1: [u32; 2],
    ibrd: Volatile<u32>, // 0x24 - Integer Baud Rate Divisor
    fbrd: Volatile<u32>, // 0x28 - Fractional Baud Rate Divisor
    lcrh: Volatile<u32>, // 0x2C - Line Control Register
    cr: Volatile<u32>,   // 0x30 - Control Register
    _rsv2: [u32; 1],
    imsc: Volatile<u32>, // 0x38 - Interrupt Mask Set/Clear
    _rsv3: [u32; 2],
    icr: Volatile<u32>, // 0x44 - Interrupt Clear Register
}

/// UART writer for serial console output.
pub struct UartWriter {
    base: usize,
    initialized: bool,
}

impl UartWriter {
    pub const fn new(base: usize) -> Self {
        UartWriter {
            base,
            initialized: false,
        }
    }

    fn registers(&mut self) -> &mut Pl011Registers {
        // SAFETY: `base` is either the documented PL011 MMIO base of the
        // `virt` machine or its high-half alias; both resolve to the same
        // device, the register layout matches the TRM, and exclusive
        // access is guaranteed by the WRITER mutex.
        unsafe { &mut *(self.base as *mut Pl011Registers) }
    }

    /// Initialize the UART hardware.
    ///
    /// 115200 baud, 8N1, FIFOs on. The `virt` machine feeds the PL011 a
    /// 24 MHz reference: divisor = 24e6 / (16 * 115200) = 13.02, so
    /// IBRD = 13 and FBRD = round(0.0208 * 64) = 1.
    pub fn init(&mut self) {
        let regs = self.registers();
        regs.cr.write(0);
        regs.imsc.write(0);
        regs.icr.write(pl011_flags::ICR_ALL);
        regs.ibrd.write(13);
        regs.fbrd.write(1);
        regs.lcrh
            .write(pl011_flags::LCRH_FEN | pl011_flags::LCRH_WLEN_8BIT);
        regs.cr.write(pl011_flags::CR_UARTEN | pl011_flags::CR_TXE);
        self.initialized = true;
    }

    /// Move the register window to a different alias of the same device.
    /// The hardware is not re-initialized; only the address changes.
    pub fn set_base(&mut self, base: usize) {
        self.base = base;
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Blocking write of one byte.
    pub fn write_byte(&mut self, byte: u8) {
        let regs = self.registers();
        while regs.fr.read() & pl011_flags::FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        regs.dr.write(byte as u32);
    }

    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                // Serial terminals want CRLF.
                b'\n' => {
                    self.write_byte(b'\r');
                    self.write_byte(b'\n');
                }
                0x20..=0x7E | b'\t' => self.write_byte(byte),
                _ => self.write_byte(0xFE),
            }
        }
    }
}

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

/// Raw byte sink used by the bring-up diagnostics.
pub fn put_byte(byte: u8) {
    WRITER.lock().write_byte(byte);
}

/// Switch the global writer to a new register alias. Called by the
/// continuation with the high-half MMIO address just before the identity
/// regime is disabled.
pub fn relocate(base: usize) {
    WRITER.lock().set_base(base);
}
