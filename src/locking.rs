use crate::irq::InterruptSource;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

pub struct SpinLock<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: The compiler is not happy because UnsafeCell is not thread-safe.
// However, when we wrap it in our SpinLock implementation it is safe to
// share between threads because we can only access its data after aquiring
// the lock which we do using atomic operations.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    // NOTE: An IRQ handler that takes a lock which is also taken from
    // foreground code on the same core will spin forever if it preempts the
    // holder. Foreground code must mask the interrupt source first, see
    // MaskedIrq below.
    pub fn lock(&self) -> LockGuard<T> {
        // We use two loops here to reduce cache coherence traffic. The swap()
        // is a write operation that will move the cache line to a 'modified'
        // or 'exclusive' state, whereas load() is a read operation and
        // multiple CPUs can have the cache line in the 'shared' state when
        // there is contention for the lock.
        while self.lock.swap(true, Ordering::Acquire) {
            while self.lock.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }

        LockGuard { lock: self }
    }
}

// The lifetime annotation means that the LockGuard can't outlive the spinlock
pub struct LockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> core::ops::Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The only way to create a LockGuard instance is by calling
        // SpinLock::lock(), hence exclusive access is guaranteed here
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> core::ops::DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The only way to create a LockGuard instance is by calling
        // SpinLock::lock(), hence exclusive access is guaranteed here
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.lock.store(false, Ordering::Release);
    }
}

/// Keeps one interrupt source masked for as long as it lives. On drop the
/// source goes back to the state it was found in, so guards nest.
pub struct MaskedIrq<'a> {
    source: &'a dyn InterruptSource,
    restore: bool,
}

impl<'a> MaskedIrq<'a> {
    pub fn new(source: &'a dyn InterruptSource) -> Self {
        let restore = source.mask();
        Self { source, restore }
    }

    /// Unmask on drop even if the source was masked when the guard was taken.
    /// Used after arming hardware whose completion must be observed.
    pub fn unmask_on_drop(&mut self) {
        self.restore = true;
    }

    /// Leave the source masked on drop. Used once the device has nothing
    /// left to interrupt for.
    pub fn keep_masked(&mut self) {
        self.restore = false;
    }
}

impl Drop for MaskedIrq<'_> {
    fn drop(&mut self) {
        if self.restore {
            self.source.unmask();
        }
    }
}
