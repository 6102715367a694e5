//! AArch64-specific architecture code
//!
//! Contains low-level ARM architecture implementations including
//! MMU configuration and exception handling.

pub mod exceptions;
pub mod mmu;
