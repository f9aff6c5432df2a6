use crate::engine::action::Event;
use crate::engine::port::PortTable;
use crate::engine::transfer::TransferBackend;
use crate::irq::IrqReturn;

impl<const N: usize> PortTable<N> {
    /// Terminal-count interrupt for `port`. Arms the next page, or finishes
    /// the request and runs the handler with the spin lock released.
    ///
    /// Only ever called from interrupt context: the port's interrupt source is
    /// already blocked, so this takes the spin lock without masking.
    pub fn complete(&self, port: usize, backend: &dyn TransferBackend) -> IrqReturn {
        let Ok(slot) = self.slot(port) else {
            return IrqReturn::Done;
        };

        let mut state = slot.lock();
        if !state.is_busy() {
            // The tail of a cancelled transfer, or a shared line firing for
            // another reason
            return IrqReturn::Done;
        }

        let event = if state.remaining > 0 {
            match state.arm_next_page(backend) {
                Ok(()) => return IrqReturn::Keep,
                Err(err) => {
                    log::warn!(
                        "Port {port}: re-arm failed with {} words left: {err}",
                        state.remaining
                    );
                    Event::Canceled
                }
            }
        } else {
            state.direction.completion()
        };

        state.reset_transfer();
        backend.stop();
        let handler = state.handler;
        drop(state);

        if let Some(handler) = handler {
            if !handler.execute(event) {
                // Only remove it if the handler didn't replace itself meanwhile
                let mut state = slot.lock();
                if state.handler.is_some_and(|h| h.same_as(&handler)) {
                    state.handler = None;
                }
            }
        }

        // The handler may have submitted the next request already
        if slot.lock().is_busy() {
            IrqReturn::Keep
        } else {
            IrqReturn::Done
        }
    }
}
