//! Host-side doubles for the hardware the engine and drivers talk to.

use crate::device::PinAssignment;
use crate::drivers::dma::{DmaEngine, DmaRequest};
use crate::engine::{
    Action, AddressSpaceValidator, CallbackValidator, ClockLimits, Direction, Event,
    EventHandler, Handler, Peripheral, PeripheralClock, PinMux, PortTable, Privilege,
    TransferBackend, TransferPage, TransferRequest,
};
use crate::error::{Error, Result};
use crate::irq::InterruptSource;
use core::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// A user-privilege handler, validated the same way drivers do it.
pub fn handler(callback: &'static dyn EventHandler) -> Handler {
    Handler::new(callback, Privilege::User, &AddressSpaceValidator).unwrap()
}

pub fn no_action() -> Action {
    Action::none(Privilege::User)
}

pub fn validator() -> &'static dyn CallbackValidator {
    &AddressSpaceValidator
}

/// A table with every port already held open once.
pub fn opened<const N: usize>(backend: &dyn TransferBackend) -> PortTable<N> {
    let table = PortTable::new();
    for port in 0..N {
        table.acquire(port, backend).unwrap();
    }
    table
}

pub trait StaticRequest {
    fn request(&'static self) -> TransferRequest;

    /// Same buffer, completing into `callback` at user privilege.
    fn request_for(&'static self, callback: &'static dyn EventHandler) -> TransferRequest;
}

impl<const N: usize> StaticRequest for [u8; N] {
    fn request(&'static self) -> TransferRequest {
        TransferRequest::from_static(self, no_action())
    }

    fn request_for(&'static self, callback: &'static dyn EventHandler) -> TransferRequest {
        TransferRequest::from_static(self, Action::new(callback, Privilege::User))
    }
}

pub struct MockIrq {
    enabled: AtomicBool,
}

impl MockIrq {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl InterruptSource for MockIrq {
    fn mask(&self) -> bool {
        self.enabled.swap(false, Ordering::SeqCst)
    }

    fn unmask(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

/// Records every event it gets and answers with a fixed keep/remove.
pub struct Recorder {
    keep: bool,
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new(keep: bool) -> Self {
        Self {
            keep,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventHandler for Recorder {
    fn on_event(&self, event: Event) -> bool {
        self.events.lock().unwrap().push(event);
        self.keep
    }
}

/// A transfer backend that only remembers what it was asked to do.
pub struct MockBackend {
    pub irq: MockIrq,
    word_size: usize,
    max_page_words: usize,
    pages: Mutex<Vec<TransferPage>>,
    page_calls: AtomicUsize,
    fail_at: AtomicUsize,
    hw_busy: AtomicBool,
    started: AtomicBool,
    stops: AtomicUsize,
}

impl MockBackend {
    pub fn new(word_size: usize, max_page_words: usize) -> Self {
        Self {
            irq: MockIrq::new(true),
            word_size,
            max_page_words,
            pages: Mutex::new(Vec::new()),
            page_calls: AtomicUsize::new(0),
            fail_at: AtomicUsize::new(usize::MAX),
            hw_busy: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    /// Pages accepted so far, in order.
    pub fn pages(&self) -> Vec<TransferPage> {
        self.pages.lock().unwrap().clone()
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_hw_busy(&self, busy: bool) {
        self.hw_busy.store(busy, Ordering::SeqCst);
    }

    /// Refuse the `call`-th `start_page` (counting from 0). `usize::MAX`
    /// turns refusals off again.
    pub fn fail_page(&self, call: usize) {
        self.fail_at.store(call, Ordering::SeqCst);
    }
}

impl TransferBackend for MockBackend {
    fn word_size(&self) -> usize {
        self.word_size
    }

    fn max_page_words(&self) -> usize {
        self.max_page_words
    }

    fn is_busy(&self) -> bool {
        self.hw_busy.load(Ordering::SeqCst)
    }

    fn start_page(&self, page: &TransferPage) -> Result<()> {
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_at.load(Ordering::SeqCst) {
            return Err(Error::Dma);
        }
        self.pages.lock().unwrap().push(*page);
        Ok(())
    }

    fn start(&self, _direction: Direction, _enabled_mask: u32) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn irq(&self) -> &dyn InterruptSource {
        &self.irq
    }
}

/// A page of plain memory standing in for a register block.
#[repr(C, align(4096))]
pub struct FakeRegs {
    words: UnsafeCell<[u32; 1024]>,
}

// SAFETY: Tests only touch a FakeRegs from one thread at a time
unsafe impl Sync for FakeRegs {}

impl FakeRegs {
    pub fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; 1024]),
        }
    }

    pub fn base(&self) -> usize {
        self.words.get() as usize
    }

    pub fn word(&self, offset: usize) -> u32 {
        assert!(offset < 4096 && offset % 4 == 0);
        // SAFETY: In bounds and aligned, see above
        unsafe { core::ptr::read_volatile((self.base() + offset) as *const u32) }
    }

    pub fn set_word(&self, offset: usize, value: u32) {
        assert!(offset < 4096 && offset % 4 == 0);
        // SAFETY: See word()
        unsafe { core::ptr::write_volatile((self.base() + offset) as *mut u32, value) }
    }
}

pub struct MockDma {
    requests: Mutex<Vec<(usize, DmaRequest)>>,
    active: AtomicBool,
    acknowledged: AtomicUsize,
    resets: AtomicUsize,
}

impl MockDma {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
            acknowledged: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> Vec<(usize, DmaRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn acknowledged(&self) -> usize {
        self.acknowledged.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl DmaEngine for MockDma {
    fn start_transfer(&self, channel: usize, request: &DmaRequest) -> Result<()> {
        self.requests.lock().unwrap().push((channel, *request));
        Ok(())
    }

    fn is_active(&self, _channel: usize) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn acknowledge(&self, _channel: usize) {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self, _channel: usize) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Grants every pin that wasn't reserved for some other function.
pub struct MockPinMux {
    reserved: Mutex<Vec<u8>>,
    claimed: Mutex<Vec<(PinAssignment, Peripheral)>>,
    released: Mutex<Vec<Peripheral>>,
}

impl MockPinMux {
    pub fn new() -> Self {
        Self {
            reserved: Mutex::new(Vec::new()),
            claimed: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn reserve(&self, pin: u8) {
        self.reserved.lock().unwrap().push(pin);
    }

    pub fn claimed(&self) -> Vec<(PinAssignment, Peripheral)> {
        self.claimed.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<Peripheral> {
        self.released.lock().unwrap().clone()
    }
}

impl PinMux for MockPinMux {
    fn claim(&self, pins: &[PinAssignment], peripheral: Peripheral) -> Result<()> {
        let reserved = self.reserved.lock().unwrap();
        if let Some(taken) = pins.iter().find(|p| reserved.contains(&p.pin)) {
            return Err(Error::PinClaim { pin: taken.pin });
        }

        let mut claimed = self.claimed.lock().unwrap();
        for &pin in pins {
            if !claimed.contains(&(pin, peripheral)) {
                claimed.push((pin, peripheral));
            }
        }
        Ok(())
    }

    fn release_all(&self, peripheral: Peripheral) {
        self.claimed.lock().unwrap().retain(|&(_, owner)| owner != peripheral);
        self.released.lock().unwrap().push(peripheral);
    }
}

pub struct MockClock {
    limits: ClockLimits,
    divisor: Mutex<Option<u32>>,
}

impl MockClock {
    pub fn new(limits: ClockLimits) -> Self {
        Self {
            limits,
            divisor: Mutex::new(None),
        }
    }

    pub fn divisor(&self) -> Option<u32> {
        *self.divisor.lock().unwrap()
    }
}

impl PeripheralClock for MockClock {
    fn limits(&self) -> ClockLimits {
        self.limits
    }

    fn set_divisor(&self, divisor: u32) {
        *self.divisor.lock().unwrap() = Some(divisor);
    }
}
