use crate::engine::port::{PortState, PortTable};
use crate::engine::transfer::TransferBackend;
use crate::error::{Error, Result};

impl<const N: usize> PortTable<N> {
    /// Takes a reference on the port. Returns `true` on the first reference,
    /// in which case the caller powers the peripheral up.
    pub fn acquire(&self, port: usize, backend: &dyn TransferBackend) -> Result<bool> {
        let mut state = self.lock(port, backend.irq())?;
        let first = state.ref_count == 0;
        if first {
            if state.is_busy() {
                // Whoever submitted it still gets its CANCELED
                let mask = self.cancel_in_flight(state, backend);
                state = self.relock(port, mask)?;
            }
            *state = PortState::IDLE;
            log::info!("Port {port}: powered up");
        }
        state.ref_count += 1;
        Ok(first)
    }

    /// Drops a reference on the port. Returns `true` when the last one went
    /// away, in which case the caller releases pins and clocks. A transfer
    /// still in flight at that point is cancelled and the handler removed.
    pub fn release(&self, port: usize, backend: &dyn TransferBackend) -> Result<bool> {
        let mut state = self.lock(port, backend.irq())?;
        match state.ref_count {
            0 => return Ok(false),
            1 => {}
            _ => {
                state.ref_count -= 1;
                return Ok(false);
            }
        }

        state.ref_count = 0;
        let mask = self.cancel_in_flight(state, backend);
        self.relock(port, mask)?.handler = None;
        log::info!("Port {port}: powered down");
        Ok(true)
    }

    pub fn is_active(&self, port: usize, backend: &dyn TransferBackend) -> Result<bool> {
        Ok(self.lock(port, backend.irq())?.is_open())
    }

    /// `Error::NoDevice` unless someone holds the port open.
    pub fn ensure_open(&self, port: usize, backend: &dyn TransferBackend) -> Result<()> {
        if self.is_active(port, backend)? {
            Ok(())
        } else {
            Err(Error::NoDevice)
        }
    }
}
