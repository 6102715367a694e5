//! Virtual memory bring-up for ARMv8-A.
//!
//! Split the way the hardware forces it to be split:
//!
//! - [`policy`]: the only module allowed to write MAIR/TCR/TTBR/VBAR/SCTLR
//!   or emit TLB/cache maintenance, one named, fully-barriered sequence per
//!   operation;
//! - [`bringup`]: the state machine that builds both regimes, verifies
//!   every critical mapping and arms the switch;
//! - [`trampoline`]: the dual-mapped instruction sequence the program
//!   counter crosses when SCTLR.M flips;
//! - [`layout`]: the linker's view of the image.
//!
//! The descriptor encoding and the table builder themselves are
//! architecture-neutral data manipulation and live in [`crate::mm`].

pub mod bringup;
pub mod layout;
pub mod policy;
pub mod trampoline;

pub use bringup::bring_up_mmu;
