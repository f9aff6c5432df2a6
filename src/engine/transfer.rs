use crate::engine::action::{Action, CallbackValidator, Event};
use crate::engine::port::{PortState, PortTable};
use crate::error::{Error, Result};
use crate::irq::InterruptSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Memory to device
    Write,
    /// Device to memory
    Read,
}

impl Direction {
    pub const fn completion(&self) -> Event {
        match self {
            Direction::Write => Event::WriteComplete,
            Direction::Read => Event::DataReady,
        }
    }
}

/// The part of a request handed to the hardware in one go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferPage {
    pub addr: usize,
    pub words: usize,
    pub word_size: usize,
    pub direction: Direction,
}

impl TransferPage {
    pub const fn bytes(&self) -> usize {
        self.words * self.word_size
    }
}

/// The hardware side of a port: how a page gets moved and how the device is
/// started and stopped.
pub trait TransferBackend: Sync {
    /// Bytes per transfer unit
    fn word_size(&self) -> usize;

    /// Largest page the hardware takes at once. Devices without DMA return
    /// `usize::MAX` so that a request is armed in a single shot.
    fn max_page_words(&self) -> usize;

    /// Hardware busy indicator (e.g. the DMA channel's active bit)
    fn is_busy(&self) -> bool;

    /// Arms one page with its terminal-count interrupt enabled.
    fn start_page(&self, page: &TransferPage) -> Result<()>;

    /// Sets the device's transfer enable bits once the first page is armed.
    fn start(&self, direction: Direction, enabled_mask: u32);

    /// Clears the transfer enable bits.
    fn stop(&self);

    /// The interrupt source that delivers this port's completions
    fn irq(&self) -> &dyn InterruptSource;
}

/// A caller's asynchronous read or write.
#[derive(Clone, Copy)]
pub struct TransferRequest {
    /// Location within the device. Must be 0: these devices are streams.
    pub loc: usize,
    pub nbyte: usize,
    buf: usize,
    pub action: Action,
}

impl TransferRequest {
    /// # Safety
    ///
    /// `buf` must point to `nbyte` bytes that stay valid (and, for reads,
    /// writable and otherwise unused) until the request completes or is
    /// cancelled.
    pub const unsafe fn new(buf: usize, nbyte: usize, action: Action) -> Self {
        Self {
            loc: 0,
            nbyte,
            buf,
            action,
        }
    }

    pub fn from_static(buf: &'static [u8], action: Action) -> Self {
        // SAFETY: A 'static shared slice outlives any transfer
        unsafe { Self::new(buf.as_ptr() as usize, buf.len(), action) }
    }

    pub const fn at(mut self, loc: usize) -> Self {
        self.loc = loc;
        self
    }

    pub const fn buf(&self) -> usize {
        self.buf
    }
}

impl PortState {
    /// Hands the next page to the hardware and advances the cursor past it.
    /// Nothing changes if the hardware refuses the page.
    pub(crate) fn arm_next_page(&mut self, backend: &dyn TransferBackend) -> Result<()> {
        let cursor = self.cursor.ok_or(Error::InvalidArgument)?;
        let page = TransferPage {
            addr: cursor,
            words: self.remaining.min(backend.max_page_words()),
            word_size: backend.word_size(),
            direction: self.direction,
        };

        backend.start_page(&page)?;
        self.remaining -= page.words;
        self.cursor = Some(cursor + page.bytes());
        Ok(())
    }
}

impl<const N: usize> PortTable<N> {
    pub fn submit_write(
        &self,
        port: usize,
        backend: &dyn TransferBackend,
        request: &TransferRequest,
        validator: &dyn CallbackValidator,
    ) -> Result<usize> {
        self.submit(port, backend, Direction::Write, request, validator)
    }

    /// Reads complete with `Event::DataReady`. None of the bindings in this
    /// crate can feed a read yet, they report `Error::Unsupported` instead.
    pub fn submit_read(
        &self,
        port: usize,
        backend: &dyn TransferBackend,
        request: &TransferRequest,
        validator: &dyn CallbackValidator,
    ) -> Result<usize> {
        self.submit(port, backend, Direction::Read, request, validator)
    }

    /// Starts an asynchronous transfer and returns the number of bytes
    /// accepted, which is `request.nbyte` rounded down to the word size.
    /// `request.action` is checked against `validator` and becomes the
    /// port's completion handler together with the transfer.
    pub fn submit(
        &self,
        port: usize,
        backend: &dyn TransferBackend,
        direction: Direction,
        request: &TransferRequest,
        validator: &dyn CallbackValidator,
    ) -> Result<usize> {
        if request.loc != 0 || request.nbyte == 0 {
            return Err(Error::InvalidArgument);
        }
        let handler = request.action.validate(validator)?;

        // Interrupts for this port stay masked until the first page is armed
        // and the new state is fully in place
        let mut state = self.lock(port, backend.irq())?;
        if !state.is_open() {
            return Err(Error::NoDevice);
        }
        if state.is_busy() || backend.is_busy() {
            return Err(Error::Busy);
        }

        let word_size = backend.word_size();
        let nbyte = request.nbyte - request.nbyte % word_size;
        if nbyte == 0 {
            return Err(Error::InvalidArgument);
        }

        state.cursor = Some(request.buf());
        state.remaining = nbyte / word_size;
        state.direction = direction;
        if let Err(err) = state.arm_next_page(backend) {
            state.reset_transfer();
            return Err(err);
        }

        state.handler = handler;
        backend.start(direction, state.enabled_mask);
        state.unmask_on_drop();

        log::debug!(
            "Port {port}: {direction:?} of {nbyte} bytes at {:#x}, {} words left after first page",
            request.buf(),
            state.remaining
        );
        Ok(nbyte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::Privilege;
    use crate::testing::{leak, opened, validator, MockBackend, Recorder, StaticRequest};

    #[test]
    fn test_submit_arms_first_page_and_truncates() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let buf = leak([0u8; 4099]);

        let accepted = table.submit_write(0, &backend, &buf.request(), validator()).unwrap();

        assert_eq!(accepted, 4096);
        let pages = backend.pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].addr, buf.as_ptr() as usize);
        assert_eq!(pages[0].words, 256);
        let state = table.state(0, &backend).unwrap();
        assert_eq!(state.remaining(), 1024 - 256);
        assert_eq!(state.cursor(), Some(buf.as_ptr() as usize + 1024));
        assert!(backend.started());
        assert!(backend.irq.is_enabled());
    }

    #[test]
    fn test_nonzero_offset_is_rejected() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let buf = leak([0u8; 64]);

        let result = table.submit_write(0, &backend, &buf.request().at(5), validator());

        assert!(matches!(result, Err(Error::InvalidArgument)));
        assert!(backend.pages().is_empty());
        assert_eq!(table.state(0, &backend).unwrap().remaining(), 0);
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let buf: &'static [u8; 0] = leak([]);

        let result = table.submit_write(0, &backend, &buf.request(), validator());
        assert!(matches!(result, Err(Error::InvalidArgument)));
    }

    #[test]
    fn test_length_truncated_to_zero_is_rejected() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let buf = leak([0u8; 3]);

        let result = table.submit_write(0, &backend, &buf.request(), validator());

        assert!(matches!(result, Err(Error::InvalidArgument)));
        assert!(backend.pages().is_empty());
        assert!(!table.state(0, &backend).unwrap().is_busy());
    }

    #[test]
    fn test_busy_port_leaves_transfer_untouched() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let first = leak([0u8; 4096]);
        let second = leak([0u8; 64]);
        let recorder = leak(Recorder::new(true));

        table.submit_write(0, &backend, &first.request_for(recorder), validator()).unwrap();
        let before = table.state(0, &backend).unwrap();

        let result = table.submit_write(0, &backend, &second.request(), validator());

        assert!(matches!(result, Err(Error::Busy)));
        let after = table.state(0, &backend).unwrap();
        assert_eq!(after.cursor(), before.cursor());
        assert_eq!(after.remaining(), before.remaining());
        assert!(after.handler().unwrap().is(recorder));
        assert_eq!(backend.pages().len(), 1);
    }

    #[test]
    fn test_hardware_busy_bit_rejects_submission() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        backend.set_hw_busy(true);
        let buf = leak([0u8; 64]);

        let result = table.submit_write(0, &backend, &buf.request(), validator());
        assert!(matches!(result, Err(Error::Busy)));
    }

    #[test]
    fn test_refused_first_page_leaves_port_idle() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        backend.fail_page(0);
        let recorder = leak(Recorder::new(true));
        let buf = leak([0u8; 64]);

        let result = table.submit_write(0, &backend, &buf.request_for(recorder), validator());

        assert!(matches!(result, Err(Error::Dma)));
        let state = table.state(0, &backend).unwrap();
        assert!(!state.is_busy());
        assert!(state.handler().is_none());
        assert!(!backend.started());
    }

    #[test]
    fn test_interrupt_only_backend_arms_single_shot() {
        let backend = MockBackend::new(2, usize::MAX);
        let table = opened::<1>(&backend);
        let buf = leak([0u8; 1000]);

        table.submit_read(0, &backend, &buf.request(), validator()).unwrap();

        let pages = backend.pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].words, 500);
        assert_eq!(pages[0].direction, Direction::Read);
        assert_eq!(table.state(0, &backend).unwrap().remaining(), 0);
    }

    #[test]
    fn test_closed_port_rejects_submission() {
        let table = PortTable::<1>::new();
        let backend = MockBackend::new(4, 256);
        let recorder = leak(Recorder::new(true));
        let buf = leak([0u8; 64]);

        let result = table.submit_write(0, &backend, &buf.request_for(recorder), validator());

        assert!(matches!(result, Err(Error::NoDevice)));
        assert!(backend.pages().is_empty());
        assert!(!backend.started());
        let state = table.state(0, &backend).unwrap();
        assert!(!state.is_busy());
        assert!(state.handler().is_none());
        assert!(backend.irq.is_enabled());
    }

    #[test]
    fn test_request_action_is_validated() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let recorder = leak(Recorder::new(true));
        let buf = leak([0u8; 64]);
        // A heap object is a user object, a kernel caller may not install it
        let request = TransferRequest::from_static(buf, Action::new(recorder, Privilege::Kernel));

        let result = table.submit_write(0, &backend, &request, validator());

        assert!(matches!(result, Err(Error::PermissionDenied)));
        assert!(backend.pages().is_empty());
        let state = table.state(0, &backend).unwrap();
        assert!(!state.is_busy());
        assert!(state.handler().is_none());
    }

    #[test]
    fn test_request_action_becomes_port_handler() {
        let backend = MockBackend::new(4, 256);
        let table = opened::<1>(&backend);
        let recorder = leak(Recorder::new(true));
        let buf = leak([0u8; 64]);

        table.submit_write(0, &backend, &buf.request_for(recorder), validator()).unwrap();

        assert!(table.state(0, &backend).unwrap().handler().unwrap().is(recorder));
    }

    #[test]
    fn test_from_static_uses_slice_bounds() {
        static SAMPLES: [u8; 8] = [0; 8];
        let request = TransferRequest::from_static(&SAMPLES, Action::none(Privilege::User));
        assert_eq!(request.loc, 0);
        assert_eq!(request.nbyte, 8);
        assert_eq!(request.buf(), SAMPLES.as_ptr() as usize);
    }
}
