use crate::engine::action::Handler;
use crate::engine::transfer::{Direction, TransferBackend};
use crate::error::{Error, Result};
use crate::irq::InterruptSource;
use crate::locking::{LockGuard, MaskedIrq, SpinLock};

/// Mutable state of one physical port.
#[derive(Clone, Copy)]
pub struct PortState {
    pub(crate) handler: Option<Handler>,
    // Some(_) exactly while a request is in flight. After the last page has
    // been armed it points one past the end of the buffer.
    pub(crate) cursor: Option<usize>,
    // Words not yet handed to the hardware
    pub(crate) remaining: usize,
    pub(crate) direction: Direction,
    pub(crate) enabled_mask: u32,
    pub(crate) ref_count: u32,
}

impl PortState {
    pub const IDLE: PortState = PortState {
        handler: None,
        cursor: None,
        remaining: 0,
        direction: Direction::Write,
        enabled_mask: 0,
        ref_count: 0,
    };

    pub fn is_busy(&self) -> bool {
        self.cursor.is_some()
    }

    /// At least one owner holds the port open
    pub fn is_open(&self) -> bool {
        self.ref_count != 0
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn enabled_mask(&self) -> u32 {
        self.enabled_mask
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn handler(&self) -> Option<Handler> {
        self.handler
    }

    pub(crate) fn reset_transfer(&mut self) {
        self.cursor = None;
        self.remaining = 0;
    }
}

/// Fixed table of ports owned by a driver, indexed by port number.
pub struct PortTable<const N: usize> {
    ports: [SpinLock<PortState>; N],
}

// Field order matters: the state lock is released before the interrupt
// source is unmasked.
pub(crate) struct PortGuard<'a> {
    state: LockGuard<'a, PortState>,
    mask: MaskedIrq<'a>,
}

impl<'a> PortGuard<'a> {
    pub(crate) fn unmask_on_drop(&mut self) {
        self.mask.unmask_on_drop();
    }

    /// Releases the lock but keeps the interrupt source masked.
    pub(crate) fn unlock(self) -> MaskedIrq<'a> {
        let PortGuard { state, mask } = self;
        drop(state);
        mask
    }
}

impl core::ops::Deref for PortGuard<'_> {
    type Target = PortState;

    fn deref(&self) -> &PortState {
        &self.state
    }
}

impl core::ops::DerefMut for PortGuard<'_> {
    fn deref_mut(&mut self) -> &mut PortState {
        &mut self.state
    }
}

impl<const N: usize> PortTable<N> {
    pub const fn new() -> Self {
        Self {
            ports: [const { SpinLock::new(PortState::IDLE) }; N],
        }
    }

    pub(crate) fn slot(&self, port: usize) -> Result<&SpinLock<PortState>> {
        self.ports.get(port).ok_or(Error::NoDevice)
    }

    /// Foreground access: masks the port's interrupt source, then locks.
    pub(crate) fn lock<'a>(
        &'a self,
        port: usize,
        irq: &'a dyn InterruptSource,
    ) -> Result<PortGuard<'a>> {
        let slot = self.slot(port)?;
        let mask = MaskedIrq::new(irq);
        Ok(PortGuard {
            state: slot.lock(),
            mask,
        })
    }

    pub(crate) fn relock<'a>(&'a self, port: usize, mask: MaskedIrq<'a>) -> Result<PortGuard<'a>> {
        let slot = self.slot(port)?;
        Ok(PortGuard {
            state: slot.lock(),
            mask,
        })
    }

    /// Copy of the port's current state.
    pub fn state(&self, port: usize, backend: &dyn TransferBackend) -> Result<PortState> {
        let state = self.lock(port, backend.irq())?;
        Ok(*state)
    }

    pub fn current_handler(
        &self,
        port: usize,
        backend: &dyn TransferBackend,
    ) -> Result<Option<Handler>> {
        Ok(self.lock(port, backend.irq())?.handler)
    }

    pub fn set_enabled_mask(
        &self,
        port: usize,
        backend: &dyn TransferBackend,
        mask: u32,
    ) -> Result<()> {
        self.lock(port, backend.irq())?.enabled_mask = mask;
        Ok(())
    }
}

impl<const N: usize> Default for PortTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
