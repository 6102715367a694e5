//! Interrupt-safe spinlock.
//!
//! A plain spinlock deadlocks the moment an exception handler touches a lock
//! that the interrupted code already holds, so the kernel variant masks IRQs
//! for as long as the lock is held and restores the previous mask state on
//! release. During MMU bring-up all exceptions are masked anyway (DAIF is
//! set on entry and stays set until after the continuation), making the
//! save/restore a no-op there; the lock still pays for itself everywhere
//! else.

use core::arch::asm;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct SpinLock<T> {
    inner: UnsafeCell<T>,
    held: AtomicBool,
}

// SAFETY: the `held` flag serialises all access to `inner`, and IRQs are
// masked while the guard lives, so an exception handler cannot re-enter.
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
            held: AtomicBool::new(false),
        }
    }

    /// Acquire the lock, masking IRQs until the returned guard drops.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let saved_daif = irq_save_and_mask();

        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        SpinLockGuard {
            lock: self,
            saved_daif,
        }
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    saved_daif: u64,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the lock is held for the guard's lifetime.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the lock is held for the guard's lifetime.
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
        irq_restore(self.saved_daif);
    }
}

/// Read DAIF, mask IRQs, return the previous value.
fn irq_save_and_mask() -> u64 {
    let daif: u64;
    // SAFETY: DAIF reads/writes are always permitted at EL1 and `daifset`
    // masks atomically.
    unsafe {
        asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack));
        asm!("msr daifset, #2", options(nomem, nostack));
    }
    daif
}

/// Write a previously saved DAIF value back.
fn irq_restore(daif: u64) {
    // SAFETY: restoring a value read from DAIF earlier on this core.
    unsafe {
        asm!("msr daif, {}", in(reg) daif, options(nomem, nostack));
    }
}
