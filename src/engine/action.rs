use crate::address::AddressVirtual;
use crate::engine::port::{PortGuard, PortTable};
use crate::engine::transfer::TransferBackend;
use crate::error::{Error, Result};
use crate::locking::MaskedIrq;
use bitflags::bitflags;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    DataReady,
    WriteComplete,
    Canceled,
}

bitflags! {
    /// Events a driver can deliver, as advertised by `get_info`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        const DATA_READY = 1 << 0;
        const WRITE_COMPLETE = 1 << 1;
        const CANCELED = 1 << 2;
    }
}

impl Event {
    pub const fn flag(&self) -> EventFlags {
        match self {
            Event::DataReady => EventFlags::DATA_READY,
            Event::WriteComplete => EventFlags::WRITE_COMPLETE,
            Event::Canceled => EventFlags::CANCELED,
        }
    }
}

/// A completion callback together with whatever context it needs.
pub trait EventHandler: Sync {
    /// Called from interrupt context (or synchronously on cancellation).
    /// Returning `false` uninstalls the handler.
    fn on_event(&self, event: Event) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Privilege {
    Kernel,
    User,
}

pub trait CallbackValidator: Sync {
    fn validate(&self, callback: &dyn EventHandler, caller: Privilege) -> Result<()>;
}

/// Accepts a callback only if the handler object lives in the caller's half
/// of the address space: kernel callers may only install kernel objects and
/// user callers only user objects.
pub struct AddressSpaceValidator;

impl CallbackValidator for AddressSpaceValidator {
    fn validate(&self, callback: &dyn EventHandler, caller: Privilege) -> Result<()> {
        // Zero-sized handlers have no meaningful address
        if core::mem::size_of_val(callback) == 0 {
            return Err(Error::PermissionDenied);
        }

        let addr = callback as *const dyn EventHandler as *const () as usize;
        let owner = if AddressVirtual::is_kernel(addr) {
            Privilege::Kernel
        } else {
            Privilege::User
        };

        if owner != caller {
            log::warn!("Rejecting {owner:?} callback at {addr:#x} for a {caller:?} caller");
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }
}

/// A callback that passed privilege validation. The only way to get one is
/// through [`Handler::new`].
#[derive(Clone, Copy)]
pub struct Handler {
    callback: &'static dyn EventHandler,
}

impl Handler {
    pub fn new(
        callback: &'static dyn EventHandler,
        caller: Privilege,
        validator: &dyn CallbackValidator,
    ) -> Result<Self> {
        validator.validate(callback, caller)?;
        Ok(Self { callback })
    }

    pub fn is(&self, callback: &dyn EventHandler) -> bool {
        core::ptr::addr_eq(self.callback, callback)
    }

    pub fn same_as(&self, other: &Handler) -> bool {
        self.is(other.callback)
    }

    pub(crate) fn execute(&self, event: Event) -> bool {
        self.callback.on_event(event)
    }
}

impl core::fmt::Debug for Handler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let addr = self.callback as *const dyn EventHandler as *const ();
        f.debug_tuple("Handler").field(&addr).finish()
    }
}

/// What a caller asks to install: an optional callback plus the privilege
/// level it is calling from.
#[derive(Clone, Copy)]
pub struct Action {
    pub callback: Option<&'static dyn EventHandler>,
    pub caller: Privilege,
}

impl Action {
    pub const fn new(callback: &'static dyn EventHandler, caller: Privilege) -> Self {
        Self {
            callback: Some(callback),
            caller,
        }
    }

    pub const fn none(caller: Privilege) -> Self {
        Self {
            callback: None,
            caller,
        }
    }

    pub fn validate(&self, validator: &dyn CallbackValidator) -> Result<Option<Handler>> {
        self.callback
            .map(|callback| Handler::new(callback, self.caller, validator))
            .transpose()
    }
}

impl<const N: usize> PortTable<N> {
    /// Installs `handler` as the port's completion handler. A transfer still
    /// in flight is cancelled first and the handler installed at that moment
    /// receives `Event::Canceled` before it is replaced. The port must be open.
    pub fn set_action(
        &self,
        port: usize,
        backend: &dyn TransferBackend,
        handler: Option<Handler>,
    ) -> Result<()> {
        let state = self.lock(port, backend.irq())?;
        if !state.is_open() {
            return Err(Error::NoDevice);
        }
        let mask = self.cancel_in_flight(state, backend);
        // The source stays masked until the new handler is in place so that
        // no completion can reach the old one in between
        let mut state = self.relock(port, mask)?;
        state.handler = handler;
        Ok(())
    }

    /// Stops an in-flight transfer and notifies the installed handler. Returns
    /// with the port unlocked and its interrupt source masked. After a
    /// cancellation the source stays masked once the guard is dropped.
    pub(crate) fn cancel_in_flight<'a>(
        &'a self,
        mut state: PortGuard<'a>,
        backend: &dyn TransferBackend,
    ) -> MaskedIrq<'a> {
        if !state.is_busy() {
            return state.unlock();
        }

        log::debug!("Cancelling transfer with {} words left", state.remaining);
        state.reset_transfer();
        backend.stop();
        let handler = state.handler;
        let mut mask = state.unlock();
        // Nothing is in flight anymore, the next submission unmasks again
        mask.keep_masked();

        if let Some(handler) = handler {
            // The handler is about to be replaced, its keep request is moot
            let _ = handler.execute(Event::Canceled);
        }
        mask
    }
}
